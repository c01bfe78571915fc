use std::path::PathBuf;

use cvlab_backend_core::api::server::serve;
use cvlab_backend_core::pipeline::catalog::{FilterCatalogSource, HttpFilterCatalog};
use cvlab_backend_core::pipeline::settings::{
    default_app_root_from_manifest_dir, load_service_settings, parse_base_url,
};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    match cli_args.first().map(String::as_str) {
        Some("list-filters") => {
            let args = cli_args.into_iter().skip(1).collect::<Vec<_>>();
            // The blocking HTTP client must not run on a runtime worker.
            tokio::task::spawn_blocking(move || run_list_filters_cli(args)).await??;
            return Ok(());
        }
        Some("describe-filter") => {
            run_describe_filter_cli(cli_args.into_iter().skip(1).collect::<Vec<_>>())?;
            return Ok(());
        }
        Some("-h" | "--help") => {
            print_usage();
            return Ok(());
        }
        _ => {}
    }

    let options = parse_common_cli_args(&cli_args)?;
    let mut settings =
        load_service_settings(options.app_root.as_path(), options.settings_path.as_deref())?;
    if let Some(raw) = options.backend_url.as_deref() {
        settings.processing_base_url = parse_base_url(raw)?;
    }
    serve(settings).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CommonCliArgs {
    app_root: PathBuf,
    settings_path: Option<String>,
    backend_url: Option<String>,
    positional: Vec<String>,
}

fn parse_common_cli_args(args: &[String]) -> CliResult<CommonCliArgs> {
    let mut out = CommonCliArgs {
        app_root: default_app_root_from_manifest_dir(),
        settings_path: None,
        backend_url: None,
        positional: Vec::new(),
    };

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--app-root" => {
                out.app_root = PathBuf::from(needs_value(i)?);
                i += 2;
            }
            "--settings" => {
                out.settings_path = Some(needs_value(i)?);
                i += 2;
            }
            "--backend-url" => {
                out.backend_url = Some(needs_value(i)?);
                i += 2;
            }
            unknown if unknown.starts_with("--") => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
            value => {
                out.positional.push(value.to_string());
                i += 1;
            }
        }
    }
    Ok(out)
}

fn run_list_filters_cli(args: Vec<String>) -> CliResult<()> {
    let options = parse_common_cli_args(&args)?;
    if let Some(extra) = options.positional.first() {
        return Err(format!("Unexpected argument: {extra}").into());
    }
    let settings =
        load_service_settings(options.app_root.as_path(), options.settings_path.as_deref())?;
    let base_url = match options.backend_url.as_deref() {
        Some(raw) => parse_base_url(raw)?,
        None => settings.processing_base_url,
    };

    let catalog = HttpFilterCatalog::new(base_url, settings.request_timeout).fetch_catalog()?;
    let counts = catalog
        .filter_counts()
        .into_iter()
        .map(|(category, count)| json!({"category": category, "count": count}))
        .collect::<Vec<_>>();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": true,
            "counts": counts,
            "categories": catalog.categories,
        }))?
    );
    Ok(())
}

fn run_describe_filter_cli(args: Vec<String>) -> CliResult<()> {
    let options = parse_common_cli_args(&args)?;
    let [filter_name] = options.positional.as_slice() else {
        return Err(std::io::Error::other("Usage: describe-filter <name>").into());
    };
    let settings =
        load_service_settings(options.app_root.as_path(), options.settings_path.as_deref())?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "filter_name": filter_name,
            "description": settings.descriptions.describe(filter_name.as_str()),
        }))?
    );
    Ok(())
}

fn print_usage() {
    println!(
        "Usage:\n  cvlab-backend-core [--backend-url URL] [--app-root DIR] [--settings FILE]\n  cvlab-backend-core list-filters [--backend-url URL] [--app-root DIR] [--settings FILE]\n  cvlab-backend-core describe-filter <name> [--app-root DIR] [--settings FILE]"
    );
}
