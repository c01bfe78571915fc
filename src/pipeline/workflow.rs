use std::fmt;

use chrono::{DateTime, Utc};

use crate::pipeline::image_data::EncodedImage;
use crate::pipeline::parameters::ParameterValues;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(u64);

impl StepId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One committed filter application. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    id: StepId,
    filter_name: String,
    parameters: ParameterValues,
    result_image: EncodedImage,
    generated_code: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl WorkflowStep {
    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn filter_name(&self) -> &str {
        self.filter_name.as_str()
    }

    pub fn parameters(&self) -> &ParameterValues {
        &self.parameters
    }

    pub fn result_image(&self) -> &EncodedImage {
        &self.result_image
    }

    pub fn generated_code(&self) -> &str {
        self.generated_code.as_str()
    }

    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Everything a step needs except its id, which the workflow assigns on append.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDraft {
    pub filter_name: String,
    pub parameters: ParameterValues,
    pub result_image: EncodedImage,
    pub generated_code: String,
    pub description: String,
}

/// Ordered chain of committed steps for the current original image.
///
/// Append-only until [`Workflow::reset`]. Ids come from a counter that survives
/// resets, so no two steps of one workflow instance ever share an id.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    steps: Vec<WorkflowStep>,
    next_id: u64,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, draft: StepDraft) -> &WorkflowStep {
        self.next_id += 1;
        let StepDraft {
            filter_name,
            parameters,
            result_image,
            generated_code,
            description,
        } = draft;
        self.steps.push(WorkflowStep {
            id: StepId(self.next_id),
            filter_name,
            parameters,
            result_image,
            generated_code,
            description,
            created_at: Utc::now(),
        });
        &self.steps[self.steps.len() - 1]
    }

    pub fn reset(&mut self) {
        self.steps.clear();
    }

    pub fn tail_image(&self) -> Option<&EncodedImage> {
        self.steps.last().map(WorkflowStep::result_image)
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        self.steps.as_slice()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
