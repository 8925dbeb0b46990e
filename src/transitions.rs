use std::collections::HashMap;

use crate::types::StepStatus;

/// Events that drive a DAG node's status forward during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepEvent {
    DependenciesSatisfied,
    DependencyFailed,
    Dispatch,
    ToolSucceeded,
    ToolFailed,
    Recovered,
}

pub type StepTransitionTable = HashMap<(StepStatus, StepEvent), StepStatus>;

/// Builds the DAG node status machine the Executor consults on every
/// scheduling decision. Any `(status, event)` pair absent from this table
/// is a logic error in the scheduler, not a recoverable runtime condition —
/// `DagExecutor` treats a missing entry as a bug, not a step failure.
pub fn build_step_transition_table() -> StepTransitionTable {
    let mut t = HashMap::new();

    t.insert((StepStatus::Pending, StepEvent::DependenciesSatisfied), StepStatus::Ready);
    t.insert((StepStatus::Pending, StepEvent::DependencyFailed), StepStatus::Skipped);

    t.insert((StepStatus::Ready, StepEvent::Dispatch), StepStatus::Running);

    t.insert((StepStatus::Running, StepEvent::ToolSucceeded), StepStatus::Completed);
    t.insert((StepStatus::Running, StepEvent::ToolFailed), StepStatus::Failed);
    t.insert((StepStatus::Running, StepEvent::Recovered), StepStatus::Completed);

    // Completed, Failed, and Skipped are terminal — no outgoing transitions.

    t
}

pub fn is_valid_transition(table: &StepTransitionTable, status: StepStatus, event: StepEvent) -> bool {
    table.contains_key(&(status, event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_dispatch_moves_to_running() {
        let table = build_step_transition_table();
        assert_eq!(table.get(&(StepStatus::Ready, StepEvent::Dispatch)), Some(&StepStatus::Running));
    }

    #[test]
    fn terminal_statuses_have_no_transitions() {
        let table = build_step_transition_table();
        for event in [StepEvent::Dispatch, StepEvent::ToolSucceeded, StepEvent::ToolFailed] {
            assert!(!is_valid_transition(&table, StepStatus::Completed, event));
            assert!(!is_valid_transition(&table, StepStatus::Skipped, event));
        }
    }
}
