use serde::{Deserialize, Serialize};

pub const TESTCASE_SCHEMA_V1: &str = "sc-tool-case.v1";

/// A scripted playthrough: the player's answers and every event they should produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    /// Logical milliseconds added to the session clock after each step.
    #[serde(default)]
    pub clock_step_ms: u64,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub expected_events: Vec<ExpectedEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TestAction {
    FakeChoice { index: usize },
    RealChoice { label: String },
    Code { code: String },
}

impl TestAction {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::FakeChoice { .. } => "fakeChoice",
            Self::RealChoice { .. } => "realChoice",
            Self::Code { .. } => "code",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExpectedEvent {
    Message { conversation: String, text: String },
    Thinking { text: String },
    Deleted { conversation: String, index: usize },
    FakeChoices { choices: Vec<String> },
    RealChoices { choices: Vec<String> },
    Locked { file: String },
    Unlocked { file: String },
    Blocked { active: String },
    End,
}

#[cfg(test)]
mod case_tests {
    use super::*;

    #[test]
    fn test_action_kind_name_reports_expected_value() {
        assert_eq!(TestAction::FakeChoice { index: 0 }.kind_name(), "fakeChoice");
        assert_eq!(
            TestAction::RealChoice {
                label: "A".to_string()
            }
            .kind_name(),
            "realChoice"
        );
        assert_eq!(
            TestAction::Code {
                code: "x".to_string()
            }
            .kind_name(),
            "code"
        );
    }

    #[test]
    fn testcase_deserialize_applies_defaults() {
        let parsed: TestCase = serde_json::from_str(r#"{"schemaVersion": "sc-tool-case.v1"}"#)
            .expect("testcase should deserialize");

        assert_eq!(parsed.schema_version, TESTCASE_SCHEMA_V1);
        assert_eq!(parsed.clock_step_ms, 0);
        assert!(parsed.actions.is_empty());
        assert!(parsed.expected_events.is_empty());
    }

    #[test]
    fn events_and_actions_deserialize_from_camel_case_tags() {
        let events: Vec<ExpectedEvent> = serde_json::from_str(
            r#"[
  {"kind":"message","conversation":"amy","text":"amy: hi"},
  {"kind":"thinking","text":"hmm"},
  {"kind":"deleted","conversation":"amy","index":2},
  {"kind":"fakeChoices","choices":["yeah"]},
  {"kind":"realChoices","choices":["A. go"]},
  {"kind":"locked","file":"vip.txt"},
  {"kind":"unlocked","file":"vip.txt"},
  {"kind":"blocked","active":"ben"},
  {"kind":"end"}
]"#,
        )
        .expect("events should deserialize");
        assert_eq!(events.len(), 9);
        assert!(matches!(events[3], ExpectedEvent::FakeChoices { .. }));
        assert_eq!(events[8], ExpectedEvent::End);

        let actions: Vec<TestAction> = serde_json::from_str(
            r#"[{"kind":"fakeChoice","index":1},{"kind":"realChoice","label":"B"},{"kind":"code","code":"X"}]"#,
        )
        .expect("actions should deserialize");
        assert_eq!(actions[0], TestAction::FakeChoice { index: 1 });
        assert_eq!(actions[2].kind_name(), "code");
    }
}
