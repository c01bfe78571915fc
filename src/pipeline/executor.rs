use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::catalog::{CatalogError, FilterCatalog};
use crate::pipeline::descriptions::FilterDescriptions;
use crate::pipeline::image_data::OriginalImage;
use crate::pipeline::parameters::{coerce_for_filter, ParameterValues};
use crate::pipeline::processing::{
    ImageSource, ProcessImageRequest, ProcessingError, SharedImageProcessingOps,
};
use crate::pipeline::workflow::{StepDraft, Workflow, WorkflowStep};

/// Turns one apply request into at most one new step.
#[derive(Clone)]
pub struct StepExecutor {
    processor: SharedImageProcessingOps,
    descriptions: Arc<FilterDescriptions>,
}

impl StepExecutor {
    pub fn new(processor: SharedImageProcessingOps, descriptions: Arc<FilterDescriptions>) -> Self {
        Self {
            processor,
            descriptions,
        }
    }

    pub fn descriptions(&self) -> &FilterDescriptions {
        &self.descriptions
    }

    /// Validates the request and picks its input without touching the network.
    ///
    /// Values are coerced against the catalog definition when the catalog knows
    /// the filter; otherwise they are forwarded as given.
    pub fn prepare(
        &self,
        filter_name: &str,
        params: &ParameterValues,
        catalog: Option<&FilterCatalog>,
        workflow: &Workflow,
        original: Option<&OriginalImage>,
    ) -> Result<ProcessImageRequest, WorkflowError> {
        let filter_name = checked_filter_name(filter_name)?;
        let source = resolve_input(workflow, original)?;

        let params = match catalog.and_then(|c| c.find(filter_name)) {
            Some(definition) => coerce_for_filter(definition, params)
                .map_err(|e| WorkflowError::InvalidParameter(e.to_string()))?,
            None => params.clone(),
        };

        Ok(ProcessImageRequest {
            source,
            filter_name: filter_name.to_string(),
            params,
        })
    }

    /// Calls the processing service. This is the only blocking step.
    pub fn execute(&self, request: &ProcessImageRequest) -> Result<StepDraft, WorkflowError> {
        let response = self.processor.process(request).map_err(|e| {
            warn!(filter = %request.filter_name, error = %e, "processing call failed");
            WorkflowError::ProcessingFailed(e.to_string())
        })?;

        Ok(StepDraft {
            filter_name: request.filter_name.clone(),
            parameters: request.params.clone(),
            result_image: response.image,
            generated_code: response.code,
            description: self.descriptions.describe(request.filter_name.as_str()),
        })
    }

    /// Prepares, executes and appends in one go for callers that own the workflow.
    pub fn run<'w>(
        &self,
        filter_name: &str,
        params: &ParameterValues,
        catalog: Option<&FilterCatalog>,
        workflow: &'w mut Workflow,
        original: Option<&OriginalImage>,
    ) -> Result<&'w WorkflowStep, WorkflowError> {
        let request = self.prepare(filter_name, params, catalog, workflow, original)?;
        let draft = self.execute(&request)?;
        let step = workflow.append(draft);
        info!(step_id = %step.id(), filter = %step.filter_name(), "workflow step appended");
        Ok(step)
    }
}

/// The trimmed filter name, rejecting blanks.
pub fn checked_filter_name(filter_name: &str) -> Result<&str, WorkflowError> {
    let filter_name = filter_name.trim();
    if filter_name.is_empty() {
        return Err(WorkflowError::InvalidParameter(String::from(
            "filter_name must not be empty",
        )));
    }
    Ok(filter_name)
}

/// The tail result when one exists, else the original upload.
pub fn resolve_input(
    workflow: &Workflow,
    original: Option<&OriginalImage>,
) -> Result<ImageSource, WorkflowError> {
    if let Some(tail) = workflow.tail_image() {
        return Ok(ImageSource::PriorResult(tail.clone()));
    }
    original
        .cloned()
        .map(ImageSource::Original)
        .ok_or(WorkflowError::NoInputImage)
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    CatalogUnavailable(#[from] CatalogError),
    #[error("no input image: upload an image before applying a filter")]
    NoInputImage,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("image processing failed: {0}")]
    ProcessingFailed(String),
    #[error("another filter ('{pending_filter}') is still being applied")]
    Busy { pending_filter: String },
}

impl From<ProcessingError> for WorkflowError {
    fn from(error: ProcessingError) -> Self {
        Self::ProcessingFailed(error.to_string())
    }
}
