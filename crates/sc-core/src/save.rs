use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::program::FeedKind;
use crate::state::{ActionRecord, ConversationState, RealSelection, Registers, ThinkingReveal};

pub const SESSION_SAVE_SCHEMA: &str = "storychat-save.v1";

/// Per-conversation save payload. The timeline itself is not stored; it is
/// regenerated by replay on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSave {
    pub program_counter: usize,
    pub fake_choice_cursor: usize,
    pub fake_choices_made: Vec<String>,
    pub waiting_for_fake_choice: bool,
    pub active_fake_choice_index: Option<usize>,
    pub real_choice_cursor: usize,
    pub real_choices_made: Vec<RealSelection>,
    pub waiting_for_real_choice: bool,
    pub active_real_choice_index: Option<usize>,
    pub selected_path: Option<String>,
    pub action_history: Vec<ActionRecord>,
    #[serde(default)]
    pub waiting_for_lock: bool,
    #[serde(default)]
    pub active_thinking_block: Option<ThinkingReveal>,
}

impl From<&ConversationState> for ConversationSave {
    fn from(state: &ConversationState) -> Self {
        Self {
            program_counter: state.program_counter,
            fake_choice_cursor: state.next_fake_choice_cursor,
            fake_choices_made: state.fake_choices_made.clone(),
            waiting_for_fake_choice: state.waiting_for_fake_choice,
            active_fake_choice_index: state.active_fake_choice_index,
            real_choice_cursor: state.next_real_choice_cursor,
            real_choices_made: state.real_choices_made.clone(),
            waiting_for_real_choice: state.waiting_for_real_choice,
            active_real_choice_index: state.active_real_choice_index,
            selected_path: state.selected_path.clone(),
            action_history: state.action_history.clone(),
            waiting_for_lock: state.waiting_for_lock,
            active_thinking_block: state.active_thinking_block.clone(),
        }
    }
}

impl ConversationSave {
    pub fn registers(&self) -> Registers {
        Registers {
            program_counter: self.program_counter,
            next_fake_choice_cursor: self.fake_choice_cursor,
            active_fake_choice_index: self.active_fake_choice_index,
            waiting_for_fake_choice: self.waiting_for_fake_choice,
            next_real_choice_cursor: self.real_choice_cursor,
            active_real_choice_index: self.active_real_choice_index,
            waiting_for_real_choice: self.waiting_for_real_choice,
            selected_path: self.selected_path.clone(),
            waiting_for_lock: self.waiting_for_lock,
            active_thinking_block: self.active_thinking_block.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFrame {
    pub key: String,
    pub triggering_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpyState {
    pub unlocked: bool,
    pub anchor_level: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPost {
    pub feed: FeedKind,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUnlock {
    pub from_key: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSave {
    pub schema_version: String,
    pub story_id: String,
    pub unlocked_files: Vec<String>,
    /// Parse order matters: programs are merged in this order on restore.
    pub parsed_files: Vec<String>,
    pub active_conversation: Option<String>,
    pub entry_stack: Vec<EntryFrame>,
    pub conversation_source_files: BTreeMap<String, Vec<String>>,
    pub conversations: BTreeMap<String, ConversationSave>,
    #[serde(default)]
    pub feed_posts: Vec<FeedPost>,
    #[serde(default)]
    pub spy: SpyState,
    #[serde(default)]
    pub attention: Vec<String>,
    #[serde(default)]
    pub clock_millis: u64,
    #[serde(default)]
    pub pending_unlock: Option<PendingUnlock>,
}

#[cfg(test)]
mod save_tests {
    use super::*;

    #[test]
    fn conversation_save_copies_decisions_not_timeline() {
        let state = ConversationState {
            program_counter: 3,
            fake_choices_made: vec!["lol".to_string()],
            next_fake_choice_cursor: 1,
            real_choices_made: vec![RealSelection {
                label: "A".to_string(),
                text: "yes".to_string(),
            }],
            next_real_choice_cursor: 1,
            selected_path: Some("A".to_string()),
            ..ConversationState::default()
        };
        let save = ConversationSave::from(&state);
        assert_eq!(save.program_counter, 3);
        assert_eq!(save.fake_choice_cursor, 1);
        assert_eq!(save.real_choices_made.len(), 1);

        let json = serde_json::to_value(&save).expect("serialize");
        assert!(json.get("playedMessages").is_none());
        assert_eq!(json["realChoiceCursor"], 1);
    }

    #[test]
    fn session_save_defaults_optional_sections() {
        let raw = r#"{
            "schemaVersion": "storychat-save.v1",
            "storyId": "story-dir:demo",
            "unlockedFiles": ["a.txt"],
            "parsedFiles": ["a.txt"],
            "activeConversation": "amy",
            "entryStack": [],
            "conversationSourceFiles": {"amy": ["a.txt"]},
            "conversations": {}
        }"#;
        let save: SessionSave = serde_json::from_str(raw).expect("deserialize");
        assert!(save.feed_posts.is_empty());
        assert_eq!(save.spy, SpyState::default());
        assert_eq!(save.clock_millis, 0);
        assert_eq!(save.pending_unlock, None);
    }

    #[test]
    fn registers_come_back_from_a_save() {
        let state = ConversationState {
            program_counter: 5,
            waiting_for_fake_choice: true,
            active_fake_choice_index: Some(2),
            next_fake_choice_cursor: 2,
            waiting_for_lock: true,
            ..ConversationState::default()
        };
        let save = ConversationSave::from(&state);
        assert_eq!(save.registers(), state.registers());
    }
}
