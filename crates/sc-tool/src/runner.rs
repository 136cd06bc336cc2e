use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use sc_api::{create_session, CreateSessionOptions, MapContentLoader, StoryPlayer};
use sc_compiler::NameTable;
use sc_core::{StepOutcome, StoryError};
use sc_runtime::{CredentialOutcome, EngineSession, EntitlementVerifier, VerifyOutcome};
use tracing::debug;

use crate::source::{read_story_dir, read_test_case};
use crate::{ExpectedEvent, ScToolError, TestAction, TestCase};

const MAX_STEPS: usize = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub observed_events: Vec<ExpectedEvent>,
    pub consumed_actions: usize,
    pub steps: usize,
}

/// Grants the manifest's access codes; a granted tier stays cached for later locks.
struct CaseVerifier {
    access_codes: BTreeMap<String, String>,
    granted_tiers: Mutex<BTreeSet<String>>,
}

impl EntitlementVerifier for CaseVerifier {
    fn has_local_credential_for(&self, tier: &str) -> bool {
        self.granted_tiers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(tier)
    }

    fn verify_remote(&self, candidate: &str, tier: &str) -> Result<VerifyOutcome, StoryError> {
        Ok(match self.access_codes.get(candidate.trim()) {
            Some(granted) if granted == tier => VerifyOutcome::Granted {
                effective_tier: granted.clone(),
            },
            _ => VerifyOutcome::Denied,
        })
    }

    fn persist_credential(&self, _candidate: &str, tier: &str) {
        self.granted_tiers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tier.to_string());
    }
}

/// Plays `story_dir` from its entry file, answering every prompt from
/// `case.actions` in order, until no conversation has anything left.
pub fn run_case(story_dir: &Path, case: &TestCase) -> Result<RunReport, ScToolError> {
    let source = read_story_dir(story_dir)?;
    let verifier = Arc::new(CaseVerifier {
        access_codes: source.manifest.access_codes.clone(),
        granted_tiers: Mutex::new(BTreeSet::new()),
    });
    let session = create_session(CreateSessionOptions {
        story_id: format!("sc-tool:{}", story_dir.display()),
        scripts: source.scripts.clone(),
        entry_file: source.manifest.entry_file.clone(),
        names: NameTable::new(
            source
                .manifest
                .names
                .iter()
                .map(|(name, key)| (name.as_str(), key.clone())),
        ),
        lock_tiers: source.manifest.locks.clone(),
        verifier: Some(verifier),
    })?;
    let mut player = StoryPlayer::new(session, Box::new(MapContentLoader::new(source.scripts)));

    let mut observed_events = Vec::new();
    let mut action_index = 0usize;
    let mut clock = 0u64;
    let mut key = player
        .session()
        .active_conversation()
        .map(str::to_string)
        .ok_or_else(|| {
            StoryError::new("TOOL_NO_CONVERSATION", "Story has no active conversation.")
        })?;

    for step in 1..=MAX_STEPS {
        let (outcome, _receipt) = player.advance(&key)?;
        debug!(step, conversation = %key, outcome = ?outcome, "case step");
        match outcome {
            StepOutcome::Displayed { message_index } => {
                observed_events.extend(message_event(player.session(), &key, message_index));
            }
            StepOutcome::Thinking { .. } => {
                let text = player
                    .session()
                    .conversation(&key)
                    .and_then(|state| state.active_thinking_block.as_ref())
                    .map(|reveal| reveal.text.clone())
                    .unwrap_or_default();
                observed_events.push(ExpectedEvent::Thinking { text });
            }
            StepOutcome::Deleted { target_message } => {
                observed_events.extend(target_message.map(|index| ExpectedEvent::Deleted {
                    conversation: key.clone(),
                    index,
                }));
            }
            StepOutcome::WaitingFakeChoice { .. } => {
                let choices = player
                    .session()
                    .pending_fake_options(&key)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default();
                observed_events.push(ExpectedEvent::FakeChoices {
                    choices: choices.clone(),
                });
                let action = next_action(case, action_index, &observed_events, "fakeChoice")?;
                let TestAction::FakeChoice { index } = action else {
                    return Err(kind_mismatch(&observed_events, "fakeChoice", action));
                };
                let text = choices.get(*index).cloned().unwrap_or_default();
                let message_index = player
                    .session_mut()
                    .select_fake_choice(&key, *index, &text)?;
                observed_events.extend(message_event(player.session(), &key, message_index));
                action_index += 1;
            }
            StepOutcome::WaitingRealChoice { block_index } => {
                let options = player
                    .session()
                    .pending_real_options(&key)
                    .map(|(_, options)| options.to_vec())
                    .unwrap_or_default();
                observed_events.push(ExpectedEvent::RealChoices {
                    choices: options
                        .iter()
                        .map(|option| format!("{}. {}", option.label, option.text))
                        .collect(),
                });
                let action = next_action(case, action_index, &observed_events, "realChoice")?;
                let TestAction::RealChoice { label } = action else {
                    return Err(kind_mismatch(&observed_events, "realChoice", action));
                };
                let text = options
                    .iter()
                    .find(|option| option.label == *label)
                    .map(|option| option.text.clone())
                    .unwrap_or_default();
                let message_index = player
                    .session_mut()
                    .select_real_choice(&key, block_index, label, &text)?;
                observed_events.extend(message_event(player.session(), &key, message_index));
                action_index += 1;
            }
            StepOutcome::WaitingLock { file } => {
                observed_events.push(ExpectedEvent::Locked { file });
                let action = next_action(case, action_index, &observed_events, "code")?;
                let TestAction::Code { code } = action else {
                    return Err(kind_mismatch(&observed_events, "code", action));
                };
                let (credential, _receipt) = player.submit_credential(&key, code)?;
                if let CredentialOutcome::Granted { file } = credential {
                    observed_events.push(ExpectedEvent::Unlocked { file });
                    key = active_or(player.session(), key);
                }
                action_index += 1;
            }
            StepOutcome::Unlock { file } | StepOutcome::Lock { file } => {
                observed_events.push(ExpectedEvent::Unlocked { file });
                key = active_or(player.session(), key);
            }
            StepOutcome::Blocked { active_key } => {
                observed_events.push(ExpectedEvent::Blocked {
                    active: active_key.clone(),
                });
                key = active_key;
            }
            StepOutcome::Finished => match next_unfinished(player.session()) {
                Some(next) => key = next,
                None => {
                    observed_events.push(ExpectedEvent::End);
                    if action_index != case.actions.len() {
                        return Err(ScToolError::UnusedActions {
                            used: action_index,
                            total: case.actions.len(),
                        });
                    }
                    return Ok(RunReport {
                        observed_events,
                        consumed_actions: action_index,
                        steps: step,
                    });
                }
            },
        }

        if case.clock_step_ms > 0 {
            clock = clock.saturating_add(case.clock_step_ms);
            for (conversation, index) in player.session_mut().tick(clock) {
                observed_events.push(ExpectedEvent::Deleted {
                    conversation,
                    index,
                });
            }
        }
    }

    Err(ScToolError::GuardExceeded {
        max_steps: MAX_STEPS,
    })
}

pub fn assert_case(story_dir: &Path, case_path: &Path) -> Result<(), ScToolError> {
    let case = read_test_case(case_path)?;
    let report = run_case(story_dir, &case)?;

    if report.observed_events.len() != case.expected_events.len() {
        let observed = serde_json::to_string_pretty(&report.observed_events)
            .map_err(ScToolError::EventSerialize)?;
        return Err(ScToolError::EventCountMismatch {
            expected: case.expected_events.len(),
            actual: report.observed_events.len(),
            observed,
        });
    }

    for (index, (expected, actual)) in case
        .expected_events
        .iter()
        .zip(report.observed_events.iter())
        .enumerate()
    {
        if expected != actual {
            let expected = serde_json::to_string(expected).map_err(ScToolError::EventSerialize)?;
            let actual = serde_json::to_string(actual).map_err(ScToolError::EventSerialize)?;
            return Err(ScToolError::EventMismatch {
                index,
                expected,
                actual,
            });
        }
    }

    Ok(())
}

fn message_event(session: &EngineSession, key: &str, index: usize) -> Option<ExpectedEvent> {
    let message = session.conversation(key)?.played_messages.get(index)?;
    Some(ExpectedEvent::Message {
        conversation: key.to_string(),
        text: message.item.preview(),
    })
}

fn next_action<'a>(
    case: &'a TestCase,
    action_index: usize,
    observed_events: &[ExpectedEvent],
    expected_action_kind: &str,
) -> Result<&'a TestAction, ScToolError> {
    case.actions
        .get(action_index)
        .ok_or_else(|| ScToolError::MissingAction {
            event_index: observed_events.len() - 1,
            expected_action_kind: expected_action_kind.to_string(),
        })
}

fn kind_mismatch(
    observed_events: &[ExpectedEvent],
    expected_action_kind: &str,
    action: &TestAction,
) -> ScToolError {
    ScToolError::ActionKindMismatch {
        event_index: observed_events.len() - 1,
        expected_action_kind: expected_action_kind.to_string(),
        actual_action_kind: action.kind_name().to_string(),
    }
}

fn active_or(session: &EngineSession, current: String) -> String {
    session
        .active_conversation()
        .map(str::to_string)
        .unwrap_or(current)
}

fn next_unfinished(session: &EngineSession) -> Option<String> {
    if let Some(active) = session.active_conversation() {
        if !session.is_finished(active) {
            return Some(active.to_string());
        }
    }
    session
        .conversation_keys()
        .find(|key| !session.is_finished(key))
        .map(str::to_string)
}

#[cfg(test)]
mod runner_tests {
    use super::*;

    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        std::env::temp_dir().join(format!("sc-tool-runner-{}-{}", name, nanos))
    }

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("path should have parent");
        fs::create_dir_all(parent).expect("parent dir should be created");
        fs::write(path, content).expect("file should be written");
    }

    fn story(name: &str, main: &str) -> std::path::PathBuf {
        let root = temp_dir(name);
        write_file(&root.join("main.txt"), main);
        root
    }

    fn case(actions: Vec<TestAction>, expected_events: Vec<ExpectedEvent>) -> TestCase {
        TestCase {
            schema_version: crate::TESTCASE_SCHEMA_V1.to_string(),
            clock_step_ms: 0,
            actions,
            expected_events,
        }
    }

    fn message(conversation: &str, text: &str) -> ExpectedEvent {
        ExpectedEvent::Message {
            conversation: conversation.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn run_case_plays_a_single_message() {
        let root = story("text-only", "Amy\namy: hi\n");
        let report = run_case(&root, &case(vec![], vec![])).expect("run should pass");
        assert_eq!(report.consumed_actions, 0);
        assert_eq!(
            report.observed_events,
            vec![message("amy", "amy: hi"), ExpectedEvent::End]
        );
    }

    #[test]
    fn run_case_answers_fake_and_real_choices() {
        let root = story(
            "choices",
            "Amy\namy: go?\n$fake.choices\nsure\n$end\n$choices\nA. yes\nB. no\npath A\namy: yay\nend path\npath B\namy: boo\nend path\n",
        );
        let actions = vec![
            TestAction::FakeChoice { index: 0 },
            TestAction::RealChoice {
                label: "A".to_string(),
            },
        ];
        let report = run_case(&root, &case(actions, vec![])).expect("run should pass");
        assert_eq!(report.consumed_actions, 2);
        assert_eq!(
            report.observed_events,
            vec![
                message("amy", "amy: go?"),
                ExpectedEvent::FakeChoices {
                    choices: vec!["sure".to_string()],
                },
                message("amy", "mc: sure"),
                ExpectedEvent::RealChoices {
                    choices: vec!["A. yes".to_string(), "B. no".to_string()],
                },
                message("amy", "mc: yes"),
                message("amy", "amy: yay"),
                ExpectedEvent::End,
            ]
        );
    }

    #[test]
    fn run_case_fires_timed_deletions_on_the_case_clock() {
        let root = story("timed-delete", "Amy\namy: oops\n$delete=500\namy: hi\n");
        let mut timed = case(vec![], vec![]);
        timed.clock_step_ms = 1_000;
        let report = run_case(&root, &timed).expect("run should pass");
        assert_eq!(
            report.observed_events,
            vec![
                message("amy", "amy: oops"),
                ExpectedEvent::Deleted {
                    conversation: "amy".to_string(),
                    index: 0,
                },
                message("amy", "amy: hi"),
                ExpectedEvent::End,
            ]
        );
    }

    #[test]
    fn run_case_reports_missing_wrong_and_unused_actions() {
        let root = story("actions", "Amy\namy: hi\n$fake.choices\nyo\n$end\n");

        let missing = run_case(&root, &case(vec![], vec![])).expect_err("missing action");
        assert!(matches!(missing, ScToolError::MissingAction { .. }));

        let wrong = case(
            vec![TestAction::Code {
                code: "x".to_string(),
            }],
            vec![],
        );
        let wrong = run_case(&root, &wrong).expect_err("kind mismatch");
        assert!(matches!(wrong, ScToolError::ActionKindMismatch { .. }));

        let bad_index = case(vec![TestAction::FakeChoice { index: 9 }], vec![]);
        let bad_index = run_case(&root, &bad_index).expect_err("engine error");
        assert!(matches!(bad_index, ScToolError::Engine(_)));

        let unused = case(
            vec![
                TestAction::FakeChoice { index: 0 },
                TestAction::FakeChoice { index: 0 },
            ],
            vec![],
        );
        let unused = run_case(&root, &unused).expect_err("unused action");
        assert!(matches!(unused, ScToolError::UnusedActions { used: 1, total: 2 }));
    }

    #[test]
    fn run_case_retries_locks_until_a_code_is_granted() {
        let root = story("locked", "Zoe\nzoe: hi\n$lock=vip.txt\n");
        write_file(&root.join("vip.txt"), "Zoe\nzoe: welcome in\n");
        write_file(
            &root.join("story.json"),
            r#"{"locks":{"vip.txt":"gold"},"accessCodes":{"GOLD":"gold"}}"#,
        );
        let actions = vec![
            TestAction::Code {
                code: "NOPE".to_string(),
            },
            TestAction::Code {
                code: "GOLD".to_string(),
            },
        ];
        let report = run_case(&root, &case(actions, vec![])).expect("run should pass");
        let locked = ExpectedEvent::Locked {
            file: "vip.txt".to_string(),
        };
        assert_eq!(
            report.observed_events,
            vec![
                message("zoe", "zoe: hi"),
                locked.clone(),
                locked,
                ExpectedEvent::Unlocked {
                    file: "vip.txt".to_string(),
                },
                message("zoe", "zoe: welcome in"),
                ExpectedEvent::End,
            ]
        );
    }

    #[test]
    fn assert_case_reports_count_and_value_mismatches() {
        let root = story("assert", "Amy\namy: hi\n");

        let count_case = root.join("count.json");
        write_file(
            &count_case,
            r#"{"schemaVersion":"sc-tool-case.v1","expectedEvents":[{"kind":"end"}]}"#,
        );
        let error = assert_case(&root, &count_case).expect_err("count mismatch should fail");
        assert!(matches!(error, ScToolError::EventCountMismatch { .. }));

        let value_case = root.join("value.json");
        write_file(
            &value_case,
            r#"{"schemaVersion":"sc-tool-case.v1","expectedEvents":[{"kind":"message","conversation":"amy","text":"amy: bye"},{"kind":"end"}]}"#,
        );
        let error = assert_case(&root, &value_case).expect_err("value mismatch should fail");
        assert!(matches!(error, ScToolError::EventMismatch { .. }));

        let pass_case = root.join("testcase.json");
        write_file(
            &pass_case,
            r#"{"schemaVersion":"sc-tool-case.v1","expectedEvents":[{"kind":"message","conversation":"amy","text":"amy: hi"},{"kind":"end"}]}"#,
        );
        assert_case(&root, &pass_case).expect("assert should pass");
    }
}
