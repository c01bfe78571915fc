use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::api::server::AppState;
use crate::pipeline::catalog::{FilterCatalog, FilterCategory};
use crate::pipeline::executor::WorkflowError;
use crate::pipeline::parameters::{self, ParameterValues};

use super::handler_utils::{internal_error, into_json, map_workflow_error, not_found, ApiObject};

#[derive(Debug, Serialize)]
struct CategoryCount {
    category: String,
    count: usize,
}

#[derive(Debug, Serialize)]
struct ListFiltersResponse {
    ok: bool,
    filter_count: usize,
    counts: Vec<CategoryCount>,
    categories: Vec<FilterCategory>,
}

#[derive(Debug, Serialize)]
struct FilterDefaultsResponse {
    ok: bool,
    filter_name: String,
    display_name: String,
    category: String,
    description: String,
    params: ParameterValues,
}

/// Always hits the processing service so a failed load can be retried.
pub async fn list_filters_handler(State(state): State<AppState>) -> ApiObject<Value> {
    let source = state.services.catalog_source.clone();
    let result = tokio::task::spawn_blocking(move || source.fetch_catalog()).await;

    match result {
        Ok(Ok(catalog)) => {
            state.store_catalog(catalog.clone());
            let counts = catalog
                .filter_counts()
                .into_iter()
                .map(|(category, count)| CategoryCount { category, count })
                .collect::<Vec<_>>();
            (
                StatusCode::OK,
                into_json(ListFiltersResponse {
                    ok: true,
                    filter_count: counts.iter().map(|c| c.count).sum(),
                    counts,
                    categories: catalog.categories,
                }),
            )
        }
        Ok(Err(error)) => map_workflow_error(WorkflowError::CatalogUnavailable(error)),
        Err(join_error) => internal_error(format!("catalog fetch task failed: {join_error}")),
    }
}

pub async fn filter_defaults_handler(
    State(state): State<AppState>,
    Path(filter_name): Path<String>,
) -> ApiObject<Value> {
    let catalog = match cached_or_fetched_catalog(&state).await {
        Ok(catalog) => catalog,
        Err(response) => return response,
    };

    let Some(definition) = catalog.find(filter_name.as_str()) else {
        return not_found(
            "unknown_filter",
            format!("Filter '{filter_name}' is not in the catalog"),
        );
    };

    (
        StatusCode::OK,
        into_json(FilterDefaultsResponse {
            ok: true,
            filter_name: definition.name.clone(),
            display_name: definition.display_name.clone(),
            category: definition.category.clone(),
            description: state.services.descriptions.describe(definition.name.as_str()),
            params: parameters::select(definition),
        }),
    )
}

async fn cached_or_fetched_catalog(state: &AppState) -> Result<FilterCatalog, ApiObject<Value>> {
    if let Some(catalog) = state.cached_catalog() {
        return Ok(catalog);
    }
    let source = state.services.catalog_source.clone();
    match tokio::task::spawn_blocking(move || source.fetch_catalog()).await {
        Ok(Ok(catalog)) => {
            state.store_catalog(catalog.clone());
            Ok(catalog)
        }
        Ok(Err(error)) => Err(map_workflow_error(WorkflowError::CatalogUnavailable(error))),
        Err(join_error) => Err(internal_error(format!(
            "catalog fetch task failed: {join_error}"
        ))),
    }
}
