mod case;
mod runner;
mod source;

pub use case::{ExpectedEvent, TestAction, TestCase, TESTCASE_SCHEMA_V1};
pub use runner::{assert_case, run_case, RunReport};
pub use source::{read_story_dir, read_test_case, StorySource, ToolManifest};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScToolError {
    #[error("Cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Testcase {path} is not valid JSON: {source}")]
    ParseCase {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Story manifest {path} is not valid JSON: {source}")]
    ParseManifest {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Testcase schema is \"{found}\"; this runner reads \"{expected}\".")]
    InvalidSchemaVersion { expected: String, found: String },
    #[error("No .txt scripts under {path}.")]
    SourceEmpty { path: PathBuf },
    #[error("Story engine rejected a step: {0}")]
    Engine(#[from] sc_core::StoryError),
    #[error("Ran out of actions at event {event_index}; the story wants a {expected_action_kind}.")]
    MissingAction {
        event_index: usize,
        expected_action_kind: String,
    },
    #[error(
        "Event {event_index} wants a {expected_action_kind} action but the next one is {actual_action_kind}."
    )]
    ActionKindMismatch {
        event_index: usize,
        expected_action_kind: String,
        actual_action_kind: String,
    },
    #[error("Story ended after {used} of {total} actions.")]
    UnusedActions { used: usize, total: usize },
    #[error("Story did not end within {max_steps} steps.")]
    GuardExceeded { max_steps: usize },
    #[error("Expected {expected} events, saw {actual}. observed={observed}")]
    EventCountMismatch {
        expected: usize,
        actual: usize,
        observed: String,
    },
    #[error("Event {index} differs. expected={expected} actual={actual}")]
    EventMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("Cannot render event as JSON: {0}")]
    EventSerialize(serde_json::Error),
}
