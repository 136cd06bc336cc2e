use serde::{Deserialize, Serialize};

use crate::program::{FeedKind, ProgramMark};
use crate::PLAYER_KEY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DisplayedItem {
    #[serde(rename_all = "camelCase")]
    Talk { speaker_key: String, text: String },
    #[serde(rename_all = "camelCase")]
    Image { speaker_key: String, file_ref: String },
    #[serde(rename_all = "camelCase")]
    Video { speaker_key: String, file_ref: String },
    #[serde(rename_all = "camelCase")]
    Audio { speaker_key: String, file_ref: String },
    Status { text: String },
}

impl DisplayedItem {
    pub fn player_line(text: impl Into<String>) -> Self {
        Self::Talk {
            speaker_key: PLAYER_KEY.to_string(),
            text: text.into(),
        }
    }

    pub fn speaker_key(&self) -> Option<&str> {
        match self {
            Self::Talk { speaker_key, .. }
            | Self::Image { speaker_key, .. }
            | Self::Video { speaker_key, .. }
            | Self::Audio { speaker_key, .. } => Some(speaker_key.as_str()),
            Self::Status { .. } => None,
        }
    }

    pub fn preview(&self) -> String {
        match self {
            Self::Talk { speaker_key, text } => format!("{}: {}", speaker_key, text),
            Self::Image {
                speaker_key,
                file_ref,
            } => format!("{}: [image {}]", speaker_key, file_ref),
            Self::Video {
                speaker_key,
                file_ref,
            } => format!("{}: [video {}]", speaker_key, file_ref),
            Self::Audio {
                speaker_key,
                file_ref,
            } => format!("{}: [audio {}]", speaker_key, file_ref),
            Self::Status { text } => format!("({})", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MessageOrigin {
    #[serde(rename_all = "camelCase")]
    Script { instruction_index: usize },
    #[serde(rename_all = "camelCase")]
    FakeChoice { block_index: usize },
    #[serde(rename_all = "camelCase")]
    RealChoice { block_index: usize, label: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayedMessage {
    pub item: DisplayedItem,
    pub origin: MessageOrigin,
    /// Program position of the deletion that removed this message.
    pub deleted_at: Option<usize>,
}

impl PlayedMessage {
    pub fn new(item: DisplayedItem, origin: MessageOrigin) -> Self {
        Self {
            item,
            origin,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_status(&self) -> bool {
        matches!(self.item, DisplayedItem::Status { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingReveal {
    pub text: String,
    pub block_index: usize,
    pub total_blocks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledDeletion {
    pub target_message: usize,
    pub fires_at: u64,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealSelection {
    pub label: String,
    pub text: String,
}

/// The scalar part of a conversation's state; everything an undo restores verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registers {
    pub program_counter: usize,
    pub next_fake_choice_cursor: usize,
    pub active_fake_choice_index: Option<usize>,
    pub waiting_for_fake_choice: bool,
    pub next_real_choice_cursor: usize,
    pub active_real_choice_index: Option<usize>,
    pub waiting_for_real_choice: bool,
    pub selected_path: Option<String>,
    pub waiting_for_lock: bool,
    pub active_thinking_block: Option<ThinkingReveal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepEffect {
    FeedPostUnlocked { feed: FeedKind, file: String },
    SpyUnlocked,
    #[serde(rename_all = "camelCase")]
    SpyAnchorReached { level: u32, prior: Option<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeMark {
    pub key: String,
    pub before: ProgramMark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSwitch {
    pub prior_active: Option<String>,
    pub target_key: String,
    /// State of the target before the switch; `None` when the switch created it.
    pub target_prior: Option<Box<ConversationState>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionKind {
    #[serde(rename_all = "camelCase")]
    Script { message_index: usize },
    #[serde(rename_all = "camelCase")]
    FakeChoice { block_index: usize },
    #[serde(rename_all = "camelCase")]
    RealChoice { block_index: usize },
    Unlock {
        file: String,
        merge: Option<MergeMark>,
        switch: Option<ConversationSwitch>,
    },
    Lock {
        file: String,
        merge: Option<MergeMark>,
        switch: Option<ConversationSwitch>,
    },
    #[serde(rename_all = "camelCase")]
    Delete { target_message: Option<usize> },
    #[serde(rename_all = "camelCase")]
    Thinking { block_index: usize },
    #[serde(rename_all = "camelCase")]
    ConversationEntry {
        from_key: Option<String>,
        file: String,
    },
}

impl ActionKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Script { .. } => "script",
            Self::FakeChoice { .. } => "fakeChoice",
            Self::RealChoice { .. } => "realChoice",
            Self::Unlock { .. } => "unlock",
            Self::Lock { .. } => "lock",
            Self::Delete { .. } => "delete",
            Self::Thinking { .. } => "thinking",
            Self::ConversationEntry { .. } => "conversationEntry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub prior: Registers,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<StepEffect>,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub program_counter: usize,
    pub played_messages: Vec<PlayedMessage>,
    pub next_fake_choice_cursor: usize,
    pub active_fake_choice_index: Option<usize>,
    pub waiting_for_fake_choice: bool,
    pub fake_choices_made: Vec<String>,
    pub next_real_choice_cursor: usize,
    pub active_real_choice_index: Option<usize>,
    pub waiting_for_real_choice: bool,
    pub real_choices_made: Vec<RealSelection>,
    pub selected_path: Option<String>,
    pub waiting_for_lock: bool,
    pub pending_deletions: Vec<ScheduledDeletion>,
    pub action_history: Vec<ActionRecord>,
    pub active_thinking_block: Option<ThinkingReveal>,
}

impl ConversationState {
    pub fn registers(&self) -> Registers {
        Registers {
            program_counter: self.program_counter,
            next_fake_choice_cursor: self.next_fake_choice_cursor,
            active_fake_choice_index: self.active_fake_choice_index,
            waiting_for_fake_choice: self.waiting_for_fake_choice,
            next_real_choice_cursor: self.next_real_choice_cursor,
            active_real_choice_index: self.active_real_choice_index,
            waiting_for_real_choice: self.waiting_for_real_choice,
            selected_path: self.selected_path.clone(),
            waiting_for_lock: self.waiting_for_lock,
            active_thinking_block: self.active_thinking_block.clone(),
        }
    }

    pub fn restore_registers(&mut self, registers: Registers) {
        self.program_counter = registers.program_counter;
        self.next_fake_choice_cursor = registers.next_fake_choice_cursor;
        self.active_fake_choice_index = registers.active_fake_choice_index;
        self.waiting_for_fake_choice = registers.waiting_for_fake_choice;
        self.next_real_choice_cursor = registers.next_real_choice_cursor;
        self.active_real_choice_index = registers.active_real_choice_index;
        self.waiting_for_real_choice = registers.waiting_for_real_choice;
        self.selected_path = registers.selected_path;
        self.waiting_for_lock = registers.waiting_for_lock;
        self.active_thinking_block = registers.active_thinking_block;
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting_for_fake_choice || self.waiting_for_real_choice || self.waiting_for_lock
    }

    pub fn is_empty(&self) -> bool {
        self.played_messages.is_empty()
            && self.action_history.is_empty()
            && self.program_counter == 0
    }

    pub fn visible_messages(&self) -> impl Iterator<Item = &PlayedMessage> {
        self.played_messages
            .iter()
            .filter(|message| !message.is_deleted())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepOutcome {
    #[serde(rename_all = "camelCase")]
    Displayed { message_index: usize },
    #[serde(rename_all = "camelCase")]
    Thinking { block_index: usize, total_blocks: usize },
    #[serde(rename_all = "camelCase")]
    Deleted { target_message: Option<usize> },
    #[serde(rename_all = "camelCase")]
    WaitingFakeChoice { block_index: usize },
    #[serde(rename_all = "camelCase")]
    WaitingRealChoice { block_index: usize },
    Unlock { file: String },
    Lock { file: String },
    WaitingLock { file: String },
    #[serde(rename_all = "camelCase")]
    Blocked { active_key: String },
    Finished,
}

impl StepOutcome {
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            Self::WaitingFakeChoice { .. }
                | Self::WaitingRealChoice { .. }
                | Self::WaitingLock { .. }
        )
    }
}
