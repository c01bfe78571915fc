use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::pipeline::descriptions::FilterDescriptions;

const DEFAULT_PROCESSING_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_BIND: &str = "127.0.0.1:8790";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SETTINGS_REL_PATH: &str = "config/cvlab.settings.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub processing_base_url: Url,
    pub bind: SocketAddr,
    pub request_timeout: Duration,
    pub descriptions: FilterDescriptions,
}

/// Shape of the optional TOML settings file. Every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    #[serde(default)]
    pub processing_base_url: Option<String>,
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("failed to read settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("invalid processing service URL '{value}': {message}")]
    InvalidBaseUrl { value: String, message: String },
    #[error("invalid bind address '{0}'")]
    InvalidBind(String),
    #[error("request timeout must be a positive number of seconds, got '{0}'")]
    InvalidTimeout(String),
}

/// Resolves settings from defaults, the TOML file, `<app_root>/.env`, then the process env.
pub fn load_service_settings(
    app_root: &Path,
    explicit_path: Option<&str>,
) -> Result<ServiceSettings, SettingsError> {
    let dotenv = load_dotenv_map(app_root).map_err(|e| SettingsError::ReadFile {
        path: app_root.join(".env").display().to_string(),
        message: e.to_string(),
    })?;
    let lookup = |key: &str| {
        std::env::var(key)
            .ok()
            .or_else(|| dotenv.get(key).cloned())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let settings_path = explicit_path
        .map(str::to_string)
        .or_else(|| lookup("CVLAB_SETTINGS_PATH"));
    let file = load_settings_file(app_root, settings_path.as_deref())?;
    resolve_service_settings(&file, lookup)
}

pub fn load_settings_file(
    app_root: &Path,
    explicit_path: Option<&str>,
) -> Result<SettingsFile, SettingsError> {
    let explicit = explicit_path
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .map(|p| if p.is_absolute() { p } else { app_root.join(p) });

    let path = match explicit {
        Some(path) => path,
        None => {
            let default_path = app_root.join(DEFAULT_SETTINGS_REL_PATH);
            if !default_path.is_file() {
                return Ok(SettingsFile::default());
            }
            default_path
        }
    };

    let raw = fs::read_to_string(path.as_path()).map_err(|e| SettingsError::ReadFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_settings_toml(raw.as_str(), path.as_path())
}

pub fn parse_settings_toml(raw: &str, path: &Path) -> Result<SettingsFile, SettingsError> {
    toml::from_str::<SettingsFile>(raw).map_err(|e| SettingsError::ParseToml {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Layers `lookup` (environment) over `file` over the built-in defaults.
pub fn resolve_service_settings(
    file: &SettingsFile,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ServiceSettings, SettingsError> {
    let base_raw = lookup("CVLAB_BACKEND_URL")
        .or_else(|| lookup("BACKEND_URL"))
        .or_else(|| file.processing_base_url.clone())
        .unwrap_or_else(|| String::from(DEFAULT_PROCESSING_BASE_URL));
    let processing_base_url = parse_base_url(base_raw.as_str())?;

    let bind_raw = lookup("CVLAB_BACKEND_BIND")
        .or_else(|| file.bind.clone())
        .unwrap_or_else(|| String::from(DEFAULT_BIND));
    let bind = bind_raw
        .parse::<SocketAddr>()
        .map_err(|_| SettingsError::InvalidBind(bind_raw.clone()))?;

    let timeout_secs = match lookup("CVLAB_REQUEST_TIMEOUT_SECS") {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| SettingsError::InvalidTimeout(raw.clone()))?,
        None => file
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
    };
    if timeout_secs == 0 {
        return Err(SettingsError::InvalidTimeout(timeout_secs.to_string()));
    }

    Ok(ServiceSettings {
        processing_base_url,
        bind,
        request_timeout: Duration::from_secs(timeout_secs),
        descriptions: FilterDescriptions::built_in()
            .with_overrides(file.descriptions.iter().map(|(k, v)| (k.clone(), v.clone()))),
    })
}

pub fn parse_base_url(value: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(value.trim()).map_err(|e| SettingsError::InvalidBaseUrl {
        value: value.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SettingsError::InvalidBaseUrl {
            value: value.to_string(),
            message: String::from("scheme must be http or https"),
        });
    }
    Ok(url)
}

fn load_dotenv_map(app_root: &Path) -> Result<HashMap<String, String>, std::io::Error> {
    let path = app_root.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let raw = fs::read_to_string(path)?;
    Ok(parse_dotenv_content(raw.as_str()))
}

fn parse_dotenv_content(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in raw.lines() {
        let mut value = line.trim();
        if value.is_empty() || value.starts_with('#') {
            continue;
        }
        if let Some(rest) = value.strip_prefix("export ") {
            value = rest.trim_start();
        }
        let Some((key_raw, value_raw)) = value.split_once('=') else {
            continue;
        };
        let key = key_raw.trim();
        if key.is_empty() {
            continue;
        }
        let mut parsed = value_raw.trim().to_string();
        if parsed.len() >= 2
            && ((parsed.starts_with('"') && parsed.ends_with('"'))
                || (parsed.starts_with('\'') && parsed.ends_with('\'')))
        {
            parsed = parsed[1..parsed.len() - 1].to_string();
        } else if let Some((before_comment, _)) = parsed.split_once(" #") {
            parsed = before_comment.trim_end().to_string();
        }
        out.insert(key.to_string(), parsed);
    }
    out
}

pub fn default_app_root_from_manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}
