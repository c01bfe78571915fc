use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::pipeline::parameters::ParameterValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Select,
    Int,
    Float,
    String,
}

impl ParameterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    pub default: ParameterValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

impl ParameterDefinition {
    /// Checks that `default` satisfies the declared type constraints.
    pub fn validate(&self) -> Result<(), String> {
        match self.kind {
            ParameterKind::Select => {
                if self.options.is_empty() {
                    return Err(format!("select parameter '{}' has no options", self.name));
                }
                let default = self.default.as_text().unwrap_or_default();
                if !self.options.iter().any(|option| option == default) {
                    return Err(format!(
                        "default of '{}' is not one of its options",
                        self.name
                    ));
                }
                Ok(())
            }
            ParameterKind::Int | ParameterKind::Float => {
                let value = match (&self.default, self.kind) {
                    (ParameterValue::Int(v), _) => *v as f64,
                    (ParameterValue::Float(v), ParameterKind::Float) => *v,
                    _ => {
                        return Err(format!(
                            "default of '{}' is not {}",
                            self.name,
                            self.kind.as_str()
                        ))
                    }
                };
                if self.min.is_some_and(|min| value < min) || self.max.is_some_and(|max| value > max)
                {
                    return Err(format!("default of '{}' is out of range", self.name));
                }
                Ok(())
            }
            ParameterKind::String => match self.default {
                ParameterValue::Text(_) => Ok(()),
                _ => Err(format!("default of '{}' is not a string", self.name)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub name: String,
    pub display_name: String,
    /// Filled from the enclosing category when the catalog is parsed.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

impl FilterDefinition {
    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|param| param.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCategory {
    pub name: String,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCatalog {
    #[serde(default)]
    pub categories: Vec<FilterCategory>,
}

impl FilterCatalog {
    /// Parses the `GET /filters` payload, stamping categories and checking defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let mut catalog: FilterCatalog = serde_json::from_str(raw)
            .map_err(|e| CatalogError::Unavailable(format!("catalog JSON decode failed: {e}")))?;
        catalog.normalize()?;
        Ok(catalog)
    }

    fn normalize(&mut self) -> Result<(), CatalogError> {
        for category in self.categories.iter_mut() {
            for filter in category.filters.iter_mut() {
                filter.category = category.name.clone();
                for param in filter.parameters.iter() {
                    param.validate().map_err(|message| {
                        CatalogError::Unavailable(format!(
                            "filter '{}' declares an invalid parameter: {message}",
                            filter.name
                        ))
                    })?;
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.categories.iter().all(|c| c.filters.is_empty())
    }

    pub fn find(&self, filter_name: &str) -> Option<&FilterDefinition> {
        self.categories
            .iter()
            .flat_map(|category| category.filters.iter())
            .find(|filter| filter.name == filter_name)
    }

    pub fn filter_counts(&self) -> Vec<(String, usize)> {
        self.categories
            .iter()
            .map(|category| (category.name.clone(), category.filters.len()))
            .collect()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("filter catalog unavailable: {0}")]
    Unavailable(String),
}

pub trait FilterCatalogSource: Send + Sync + 'static {
    fn fetch_catalog(&self) -> Result<FilterCatalog, CatalogError>;
}

pub type SharedFilterCatalogSource = Arc<dyn FilterCatalogSource>;

#[derive(Debug, Clone)]
pub struct HttpFilterCatalog {
    base_url: Url,
    timeout: Duration,
}

impl HttpFilterCatalog {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self { base_url, timeout }
    }

    pub fn endpoint(&self) -> Result<Url, CatalogError> {
        join_endpoint(&self.base_url, "filters").map_err(CatalogError::Unavailable)
    }
}

impl FilterCatalogSource for HttpFilterCatalog {
    fn fetch_catalog(&self) -> Result<FilterCatalog, CatalogError> {
        let endpoint = self.endpoint()?;
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| CatalogError::Unavailable(format!("http client init failed: {e}")))?;
        let resp = client
            .get(endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| {
                warn!(endpoint = %endpoint, error = %e, "catalog request failed");
                CatalogError::Unavailable(format!("catalog request failed: {e}"))
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Unavailable(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }
        let body = resp
            .text()
            .map_err(|e| CatalogError::Unavailable(format!("HTTP body read failed: {e}")))?;
        let catalog = FilterCatalog::from_json_str(body.as_str())?;
        debug!(categories = catalog.categories.len(), "filter catalog fetched");
        Ok(catalog)
    }
}

/// Joins `path` under `base`, keeping any path prefix the base already carries.
pub(crate) fn join_endpoint(base: &Url, path: &str) -> Result<Url, String> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(with_slash.as_str());
    }
    base.join(path)
        .map_err(|e| format!("invalid endpoint '{path}' under '{base}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CATALOG_JSON: &str = r#"{
        "categories": [
            {"name": "Color Operations", "filters": [
                {"name": "grayscale", "display_name": "Grayscale", "parameters": []},
                {"name": "brightness_contrast", "display_name": "Brightness/Contrast", "parameters": [
                    {"name": "alpha", "type": "float", "default": 1.0, "min": 0.0, "max": 3.0, "step": 0.1},
                    {"name": "beta", "type": "int", "default": 0, "min": -100, "max": 100, "step": 1}
                ]}
            ]},
            {"name": "Blurring & Smoothing", "filters": [
                {"name": "gaussian_blur", "display_name": "Gaussian Blur", "parameters": [
                    {"name": "kernel_size", "type": "int", "default": 5, "min": 1, "max": 31, "step": 2}
                ]}
            ]}
        ]
    }"#;

    #[test]
    fn parses_catalog_and_stamps_category_names() {
        let catalog = FilterCatalog::from_json_str(CATALOG_JSON).expect("catalog should parse");
        assert!(!catalog.is_empty());
        let blur = catalog.find("gaussian_blur").expect("blur should exist");
        assert_eq!(blur.category, "Blurring & Smoothing");
        assert_eq!(blur.parameters[0].kind, ParameterKind::Int);
        assert_eq!(
            catalog.filter_counts(),
            vec![
                (String::from("Color Operations"), 2),
                (String::from("Blurring & Smoothing"), 1)
            ]
        );
        assert!(catalog.find("sobel").is_none());
    }

    #[test]
    fn rejects_defaults_that_violate_constraints() {
        let raw = r#"{"categories":[{"name":"Thresholding","filters":[
            {"name":"binary_threshold","display_name":"Binary","parameters":[
                {"name":"method","type":"select","default":"otsu","options":["binary","binary_inv"]}
            ]}
        ]}]}"#;
        let err = FilterCatalog::from_json_str(raw).expect_err("invalid default should fail");
        assert!(matches!(err, CatalogError::Unavailable(ref m) if m.contains("binary_threshold")));

        let raw = r#"{"categories":[{"name":"Blur","filters":[
            {"name":"median_blur","display_name":"Median","parameters":[
                {"name":"kernel_size","type":"int","default":99,"min":1,"max":31}
            ]}
        ]}]}"#;
        assert!(FilterCatalog::from_json_str(raw).is_err());
    }

    #[test]
    fn malformed_payload_is_reported_as_unavailable() {
        let err = FilterCatalog::from_json_str("<html>").expect_err("html should fail");
        assert!(matches!(err, CatalogError::Unavailable(ref m) if m.contains("decode")));
    }

    #[test]
    fn endpoint_join_keeps_base_path_prefix() {
        let base = Url::parse("http://localhost:8000/api").expect("url should parse");
        assert_eq!(
            join_endpoint(&base, "filters").expect("join should work").as_str(),
            "http://localhost:8000/api/filters"
        );
        let base = Url::parse("http://localhost:8000").expect("url should parse");
        assert_eq!(
            join_endpoint(&base, "process-image")
                .expect("join should work")
                .as_str(),
            "http://localhost:8000/process-image"
        );
    }
}
