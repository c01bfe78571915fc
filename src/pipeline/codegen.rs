use crate::pipeline::workflow::WorkflowStep;

pub const SCRIPT_PREAMBLE: &str = "import cv2\nimport numpy as np\n\n# Load image\nimage = cv2.imread('your_image.jpg')\n\n";

pub const SCRIPT_POSTAMBLE: &str = "\n\n# Display or save result\ncv2.imshow('Final Result', image)\ncv2.waitKey(0)\ncv2.destroyAllWindows()";

/// Rendered in place of a script while no step exists.
pub const EMPTY_WORKFLOW_PLACEHOLDER: &str = "# Apply filters to see the generated code";

/// Joins every step's fragment, in order, between the fixed load and display blocks.
pub fn render(steps: &[WorkflowStep]) -> String {
    if steps.is_empty() {
        return String::from(EMPTY_WORKFLOW_PLACEHOLDER);
    }

    let body = steps
        .iter()
        .enumerate()
        .map(|(index, step)| step_block(index, step))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut script =
        String::with_capacity(SCRIPT_PREAMBLE.len() + body.len() + SCRIPT_POSTAMBLE.len());
    script.push_str(SCRIPT_PREAMBLE);
    script.push_str(body.as_str());
    script.push_str(SCRIPT_POSTAMBLE);
    script
}

pub fn step_header(index: usize, filter_name: &str) -> String {
    format!("# Step {}: Apply {filter_name} filter", index + 1)
}

fn step_block(index: usize, step: &WorkflowStep) -> String {
    format!(
        "{}\n{}",
        step_header(index, step.filter_name()),
        step.generated_code()
    )
}
