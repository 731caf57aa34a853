// Outcome Classifier
// Maps a work unit's terminal state to a step status

use crate::domain::error::{DomainError, Result};
use crate::domain::{ContextState, ResultRecord, StepStatus, WorkUnit};

/// Step status for a context state, if the state is terminal
pub fn step_status(state: ContextState) -> Option<StepStatus> {
    match state {
        ContextState::Successful => Some(StepStatus::Success),
        ContextState::Failure | ContextState::Error => Some(StepStatus::Failure),
        ContextState::Pending | ContextState::Running => None,
    }
}

/// Classify one work unit. Only valid after the unit's pipeline returned.
pub fn classify<W: WorkUnit>(unit: &W) -> Result<ResultRecord> {
    let state = unit.state();
    let status = step_status(state).ok_or_else(|| DomainError::UnclassifiableState {
        connector: unit.label().to_string(),
        state: state.to_string(),
    })?;

    Ok(ResultRecord {
        connector: unit.label().to_string(),
        language: unit.class_key(),
        final_state: state,
        status,
    })
}

/// Classify every unit in input order, failing on the first unrecognized state
pub fn classify_all<W: WorkUnit>(units: &[W]) -> Result<Vec<ResultRecord>> {
    units.iter().map(classify).collect()
}
