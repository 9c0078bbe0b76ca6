//! Property-based tests for folding step replies into workflow state

use conduit::workflow::{StepArguments, StepResult, WorkflowState};
use proptest::prelude::*;
use serde_json::json;

fn files() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("src/[a-z]{1,6}\\.rs", 0..6)
}

proptest! {
    /// Accumulated lists never hold duplicates, however often entries repeat.
    #[test]
    fn files_checked_stay_unique(batches in prop::collection::vec(files(), 1..5)) {
        let mut state = WorkflowState::from_arguments("debug", "c1", &StepArguments::first_step("goal", 3));
        for (i, batch) in batches.iter().enumerate() {
            let reply = json!({
                "step_number": i + 1,
                "next_step_required": true,
                "files_checked": batch,
            });
            let result = StepResult::parse(&reply.to_string()).unwrap();
            state.apply(&result);
        }
        let mut deduped = state.files_checked.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), state.files_checked.len());
        for batch in &batches {
            for file in batch {
                prop_assert!(state.files_checked.contains(file));
            }
        }
    }

    /// The step total never drops below the current step, and the tool's own
    /// step number never moves the counter.
    #[test]
    fn total_steps_covers_current_step(step in 1u32..50, reported in 0u32..50, total in 0u32..50) {
        let mut args = StepArguments::first_step("goal", 1);
        args.step_number = step;
        let mut state = WorkflowState::from_arguments("planner", "c1", &args);
        let reply = json!({"step_number": reported, "total_steps": total, "next_step_required": true});
        state.apply(&StepResult::parse(&reply.to_string()).unwrap());
        prop_assert!(state.total_steps >= state.current_step);
        prop_assert_eq!(state.current_step, step);
        prop_assert_eq!(state.next_arguments(&args, None).step_number, step + 1);
    }

    /// Saving the same reply twice yields the same merged state.
    #[test]
    fn merging_from_arguments_is_idempotent(batch in files(), findings in "[a-z ]{0,30}") {
        let args = StepArguments::first_step("goal", 3);
        let reply = json!({"step_number": 1, "next_step_required": true, "files_checked": batch, "findings": findings});
        let result = StepResult::parse(&reply.to_string()).unwrap();

        let mut once = WorkflowState::from_arguments("debug", "c1", &args);
        once.apply(&result);
        let mut again = WorkflowState::from_arguments("debug", "c1", &args);
        again.apply(&result);
        prop_assert_eq!(once, again);
    }
}
