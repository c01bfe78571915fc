//! Per-session orchestrator.
//!
//! Owns the original image, the workflow and the cached catalog of one editing
//! session, and serializes applies through an explicit `Idle`/`Pending` state.
//! The processing call runs without the state lock held; a drop guard returns
//! the session to `Idle` on success, failure and unwinding alike. While a call
//! is pending, further applies, resets and image replacements are rejected with
//! [`WorkflowError::Busy`], so an in-flight result always lands on the workflow
//! it was computed from.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use crate::pipeline::catalog::{FilterCatalog, SharedFilterCatalogSource};
use crate::pipeline::codegen;
use crate::pipeline::descriptions::FilterDescriptions;
use crate::pipeline::executor::{
    checked_filter_name, resolve_input, StepExecutor, WorkflowError,
};
use crate::pipeline::image_data::{EncodedImage, OriginalImage};
use crate::pipeline::parameters::{self, ParameterValues};
use crate::pipeline::processing::SharedImageProcessingOps;
use crate::pipeline::workflow::{Workflow, WorkflowStep};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Pending { filter_name: String },
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending { .. } => "pending",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub original: Option<OriginalImage>,
    pub steps: Vec<WorkflowStep>,
}

/// A freshly appended step and its 1-based position, read under the same lock.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedStep {
    pub step: WorkflowStep,
    pub position: usize,
}

#[derive(Debug, Default)]
struct SessionInner {
    state: SessionState,
    original: Option<OriginalImage>,
    workflow: Workflow,
    catalog: Option<FilterCatalog>,
}

pub struct WorkflowSession {
    inner: Mutex<SessionInner>,
    executor: StepExecutor,
    catalog_source: SharedFilterCatalogSource,
}

impl WorkflowSession {
    pub fn new(
        processor: SharedImageProcessingOps,
        catalog_source: SharedFilterCatalogSource,
        descriptions: Arc<FilterDescriptions>,
    ) -> Self {
        Self {
            inner: Mutex::new(SessionInner::default()),
            executor: StepExecutor::new(processor, descriptions),
            catalog_source,
        }
    }

    /// Seeds the cached catalog, e.g. from a catalog shared by many sessions.
    pub fn with_catalog(self, catalog: FilterCatalog) -> Self {
        self.lock().catalog = Some(catalog);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches the catalog. On failure the previous catalog, if any, is kept.
    pub fn refresh_catalog(&self) -> Result<FilterCatalog, WorkflowError> {
        match self.catalog_source.fetch_catalog() {
            Ok(catalog) => {
                info!(categories = catalog.categories.len(), "filter catalog refreshed");
                self.lock().catalog = Some(catalog.clone());
                Ok(catalog)
            }
            Err(error) => {
                warn!(error = %error, "filter catalog refresh failed");
                Err(WorkflowError::CatalogUnavailable(error))
            }
        }
    }

    pub fn catalog(&self) -> Option<FilterCatalog> {
        self.lock().catalog.clone()
    }

    /// Default parameter values for `filter_name`, if the cached catalog knows it.
    pub fn select_filter(&self, filter_name: &str) -> Option<ParameterValues> {
        self.lock()
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.find(filter_name))
            .map(parameters::select)
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// Installs a new original image and clears the workflow built on the old one.
    pub fn replace_original(&self, image: OriginalImage) -> Result<(), WorkflowError> {
        let mut inner = self.lock();
        ensure_idle(&inner.state)?;
        let dropped = inner.workflow.len();
        inner.workflow.reset();
        info!(
            file_name = %image.file_name(),
            bytes = image.len(),
            dropped_steps = dropped,
            "original image replaced"
        );
        inner.original = Some(image);
        Ok(())
    }

    pub fn reset(&self) -> Result<(), WorkflowError> {
        let mut inner = self.lock();
        ensure_idle(&inner.state)?;
        let dropped = inner.workflow.len();
        inner.workflow.reset();
        info!(dropped_steps = dropped, "workflow reset");
        Ok(())
    }

    /// Applies `filter_name` to the current tail (or the original) and appends the result.
    ///
    /// Busy and missing-input rejections happen before any network call. The
    /// catalog is fetched only when none is cached, while the session is Pending.
    pub fn apply(
        &self,
        filter_name: &str,
        params: &ParameterValues,
    ) -> Result<AppliedStep, WorkflowError> {
        let needs_catalog = {
            let mut inner = self.lock();
            if let Err(error) = ensure_idle(&inner.state) {
                warn!(filter = %filter_name, "apply rejected while another step is pending");
                return Err(error);
            }
            let name = checked_filter_name(filter_name)?;
            resolve_input(&inner.workflow, inner.original.as_ref())?;
            inner.state = SessionState::Pending {
                filter_name: name.to_string(),
            };
            inner.catalog.is_none()
        };
        let _pending = PendingGuard { inner: &self.inner };

        if needs_catalog {
            // Unreachable catalog: values are forwarded uncoerced.
            let _ = self.refresh_catalog();
        }

        let request = {
            let inner = self.lock();
            self.executor.prepare(
                filter_name,
                params,
                inner.catalog.as_ref(),
                &inner.workflow,
                inner.original.as_ref(),
            )?
        };
        info!(
            filter = %request.filter_name,
            source = request.source.label(),
            "apply accepted"
        );

        let draft = self.executor.execute(&request)?;

        let mut inner = self.lock();
        let step = inner.workflow.append(draft).clone();
        let position = inner.workflow.len();
        info!(
            step_id = %step.id(),
            filter = %step.filter_name(),
            steps = position,
            "workflow step appended"
        );
        Ok(AppliedStep { step, position })
    }

    pub fn steps(&self) -> Vec<WorkflowStep> {
        self.lock().workflow.steps().to_vec()
    }

    pub fn tail_image(&self) -> Option<EncodedImage> {
        self.lock().workflow.tail_image().cloned()
    }

    pub fn render_code(&self) -> String {
        codegen::render(self.lock().workflow.steps())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            state: inner.state.clone(),
            original: inner.original.clone(),
            steps: inner.workflow.steps().to_vec(),
        }
    }

    pub fn describe(&self, filter_name: &str) -> String {
        self.executor.descriptions().describe(filter_name)
    }
}

fn ensure_idle(state: &SessionState) -> Result<(), WorkflowError> {
    match state {
        SessionState::Idle => Ok(()),
        SessionState::Pending { filter_name } => Err(WorkflowError::Busy {
            pending_filter: filter_name.clone(),
        }),
    }
}

struct PendingGuard<'a> {
    inner: &'a Mutex<SessionInner>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state = SessionState::Idle;
    }
}
