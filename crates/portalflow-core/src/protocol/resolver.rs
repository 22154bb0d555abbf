use super::TaskProtocol;
use crate::error::{OrchestratorError, Result};
use crate::fields::FieldSet;

/// Steps to run for one call: `next..=target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub next: usize,
    pub target: usize,
}

/// Decides which steps a call runs.
///
/// `current` is the index of the last completed step (`None` before the
/// first call). An explicit `step` tag wins; otherwise the furthest step whose
/// triggers are all present in `fields` becomes the target. Every step on the
/// way to the target must be runnable with the same fields.
pub fn resolve_step(
    protocol: &TaskProtocol,
    current: Option<usize>,
    fields: &FieldSet,
    explicit: Option<&str>,
) -> Result<Resolution> {
    let next = current.map_or(0, |index| index + 1);
    let Some(next_step) = protocol.step(next) else {
        return Err(OrchestratorError::InputInvalid(format!(
            "Task '{}' has no steps left to run",
            protocol.task
        )));
    };

    let target = match explicit {
        Some(tag) => match protocol.position(tag) {
            Some(index) if index >= next => index,
            Some(_) => {
                return Err(OrchestratorError::InputInvalid(format!(
                    "Step '{}' of task '{}' has already been completed",
                    tag, protocol.task
                )));
            }
            None => {
                return Err(OrchestratorError::InputInvalid(format!(
                    "Unknown step '{}' for task '{}'",
                    tag, protocol.task
                )));
            }
        },
        None => protocol
            .steps
            .iter()
            .enumerate()
            .skip(next)
            .rev()
            .find(|(_, step)| step.is_satisfied(fields))
            .map(|(index, _)| index)
            .ok_or_else(|| {
                OrchestratorError::missing_fields(next_step.tag, &next_step.missing(fields))
            })?,
    };

    for step in &protocol.steps[next..=target] {
        let missing = step.missing(fields);
        if !missing.is_empty() {
            return Err(OrchestratorError::missing_fields(step.tag, &missing));
        }
    }

    Ok(Resolution { next, target })
}
