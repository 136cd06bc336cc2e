use std::collections::BTreeMap;
use std::path::PathBuf;

use sc_compiler::NameTable;
use sc_core::{DisplayedItem, SessionSave};
use sc_runtime::CredentialOutcome;
use serde::{Deserialize, Serialize};

pub(crate) const PLAYER_STATE_SCHEMA: &str = "storychat-state.v1";
pub(crate) const STORY_MANIFEST_FILE: &str = "story.json";

/// `story.json`; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoryManifest {
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) entry_file: Option<String>,
    /// Display name to conversation key.
    #[serde(default)]
    pub(crate) names: BTreeMap<String, String>,
    /// Locked file to required tier.
    #[serde(default)]
    pub(crate) locks: BTreeMap<String, String>,
    /// Access code to the tier it grants.
    #[serde(default)]
    pub(crate) access_codes: BTreeMap<String, String>,
    #[serde(default)]
    pub(crate) auto_advance_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub(crate) struct LoadedStory {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) root: PathBuf,
    pub(crate) scripts: BTreeMap<String, String>,
    pub(crate) manifest: StoryManifest,
}

impl LoadedStory {
    pub(crate) fn name_table(&self) -> NameTable {
        NameTable::new(
            self.manifest
                .names
                .iter()
                .map(|(name, key)| (name.as_str(), key.clone())),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerState {
    pub(crate) schema_version: String,
    pub(crate) story_id: String,
    pub(crate) save: SessionSave,
    #[serde(default)]
    pub(crate) credentials: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoundaryEvent {
    Message,
    FakeChoices,
    RealChoices,
    Locked,
    Unlocked,
    End,
    Blocked,
}

impl BoundaryEvent {
    pub(crate) fn protocol_name(self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::FakeChoices => "FAKE_CHOICES",
            Self::RealChoices => "REAL_CHOICES",
            Self::Locked => "LOCKED",
            Self::Unlocked => "UNLOCKED",
            Self::End => "END",
            Self::Blocked => "BLOCKED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct MessageView {
    pub(crate) conversation: String,
    pub(crate) index: usize,
    pub(crate) item: DisplayedItem,
}

#[derive(Debug, Clone)]
pub(crate) struct BoundaryResult {
    pub(crate) event: BoundaryEvent,
    pub(crate) conversation: String,
    pub(crate) active: Option<String>,
    pub(crate) messages: Vec<MessageView>,
    pub(crate) thinking: Vec<String>,
    pub(crate) deleted: Vec<(String, usize)>,
    /// Option id (fake index or real label) and text.
    pub(crate) choices: Vec<(String, String)>,
    pub(crate) choice_block: Option<usize>,
    pub(crate) locked_file: Option<String>,
    pub(crate) unlocked_file: Option<String>,
    pub(crate) credential: Option<CredentialOutcome>,
    pub(crate) undone: Option<bool>,
    pub(crate) attention: Vec<String>,
}

impl BoundaryResult {
    pub(crate) fn new(event: BoundaryEvent, conversation: &str) -> Self {
        Self {
            event,
            conversation: conversation.to_string(),
            active: None,
            messages: Vec::new(),
            thinking: Vec::new(),
            deleted: Vec::new(),
            choices: Vec::new(),
            choice_block: None,
            locked_file: None,
            unlocked_file: None,
            credential: None,
            undone: None,
            attention: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TuiCommandAction {
    NotHandled,
    Continue,
    RefreshBoundary,
    Quit,
}

pub(crate) struct TuiCommandContext<'a> {
    pub(crate) state_file: &'a str,
    pub(crate) story: &'a LoadedStory,
}
