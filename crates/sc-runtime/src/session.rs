use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sc_compiler::{parse_script, NameTable, ProgramRegistry};
pub use sc_core::PendingUnlock;
use sc_core::{
    ActionKind, ConversationHeader, ConversationState, ConversationSwitch, EntryFrame, FeedKind,
    FeedPost, Instruction, MergeMark, Program, RealChoiceOption, SpyState, StepEffect,
    StepOutcome, StoryError,
};
use tracing::{debug, info, warn};

use crate::engine::{self, ConversationVm, StepEnv, StepMode, UndoStep};
use crate::host::{CredentialOutcome, EntitlementVerifier, NoCredentials, DEFAULT_LOCK_TIER};

mod coordinator;
mod lock;
mod navigate;
mod snapshot;

#[derive(Clone, Default)]
pub struct SessionOptions {
    pub story_id: String,
    pub names: NameTable,
    pub lock_tiers: BTreeMap<String, String>,
    pub verifier: Option<Arc<dyn EntitlementVerifier>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockReceipt {
    pub file: String,
    /// Conversation the file was merged into; `None` for a file without participants.
    pub key: Option<String>,
    pub switched: bool,
}

/// All state of one running story. Owned by the caller; nothing is global.
pub struct EngineSession {
    story_id: String,
    names: NameTable,
    lock_tiers: BTreeMap<String, String>,
    verifier: Arc<dyn EntitlementVerifier>,

    registry: ProgramRegistry,
    conversations: BTreeMap<String, ConversationState>,
    unlocked_files: Vec<String>,
    parsed_files: Vec<String>,
    active_conversation: Option<String>,
    entry_stack: Vec<EntryFrame>,
    conversation_source_files: BTreeMap<String, Vec<String>>,
    feed_posts: Vec<FeedPost>,
    spy: SpyState,
    attention: BTreeSet<String>,
    clock_millis: u64,
    pending_unlock: Option<PendingUnlock>,
    diagnostics: Vec<(String, StoryError)>,
}

impl EngineSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            story_id: options.story_id,
            names: options.names,
            lock_tiers: options.lock_tiers,
            verifier: options.verifier.unwrap_or_else(|| Arc::new(NoCredentials)),
            registry: ProgramRegistry::new(),
            conversations: BTreeMap::new(),
            unlocked_files: Vec::new(),
            parsed_files: Vec::new(),
            active_conversation: None,
            entry_stack: Vec::new(),
            conversation_source_files: BTreeMap::new(),
            feed_posts: Vec::new(),
            spy: SpyState::default(),
            attention: BTreeSet::new(),
            clock_millis: 0,
            pending_unlock: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    pub fn conversation(&self, key: &str) -> Option<&ConversationState> {
        self.conversations.get(key)
    }

    pub fn conversation_keys(&self) -> impl Iterator<Item = &str> {
        self.conversations.keys().map(String::as_str)
    }

    pub fn program(&self, key: &str) -> Option<&Program> {
        self.registry.program(key)
    }

    pub fn header(&self, key: &str) -> Option<&ConversationHeader> {
        self.registry.header(key)
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active_conversation.as_deref()
    }

    pub fn unlocked_files(&self) -> &[String] {
        &self.unlocked_files
    }

    pub fn parsed_files(&self) -> &[String] {
        &self.parsed_files
    }

    pub fn entry_stack(&self) -> &[EntryFrame] {
        &self.entry_stack
    }

    pub fn source_files(&self, key: &str) -> &[String] {
        self.conversation_source_files
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn feed_posts(&self) -> &[FeedPost] {
        &self.feed_posts
    }

    pub fn spy(&self) -> &SpyState {
        &self.spy
    }

    pub fn clock_millis(&self) -> u64 {
        self.clock_millis
    }

    pub fn pending_unlock(&self) -> Option<&PendingUnlock> {
        self.pending_unlock.as_ref()
    }

    pub fn diagnostics(&self) -> &[(String, StoryError)] {
        &self.diagnostics
    }

    pub fn needs_attention(&self, key: &str) -> bool {
        self.attention.contains(key)
    }

    pub fn clear_attention(&mut self, key: &str) {
        self.attention.remove(key);
    }

    pub fn lock_tier(&self, file: &str) -> &str {
        self.lock_tiers
            .get(file)
            .map(String::as_str)
            .unwrap_or(DEFAULT_LOCK_TIER)
    }

    pub fn is_finished(&self, key: &str) -> bool {
        let Some(state) = self.conversations.get(key) else {
            return true;
        };
        let empty = Program::default();
        let program = self.registry.program(key).unwrap_or(&empty);
        engine::is_finished(state, program)
    }

    pub fn pending_fake_options(&self, key: &str) -> Option<&[String]> {
        let state = self.conversations.get(key)?;
        if !state.waiting_for_fake_choice {
            return None;
        }
        let block = self
            .registry
            .program(key)?
            .fake_choices
            .get(state.active_fake_choice_index?)?;
        Some(&block.options)
    }

    pub fn pending_real_options(&self, key: &str) -> Option<(usize, &[RealChoiceOption])> {
        let state = self.conversations.get(key)?;
        if !state.waiting_for_real_choice {
            return None;
        }
        let block_index = state.active_real_choice_index?;
        let block = self.registry.program(key)?.real_choices.get(block_index)?;
        Some((block_index, &block.options))
    }

    fn require_conversation(&self, key: &str) -> Result<(), StoryError> {
        if self.conversations.contains_key(key) {
            return Ok(());
        }
        Err(unknown_conversation(key))
    }

    fn is_unlocked(&self, file: &str) -> bool {
        self.unlocked_files.iter().any(|known| known == file)
    }

    fn apply_effects(&mut self, effects: &[StepEffect]) {
        for effect in effects {
            match effect {
                StepEffect::FeedPostUnlocked { feed, file } => {
                    info!(feed = feed.command_name(), file = %file, "feed post unlocked");
                    self.feed_posts.push(FeedPost {
                        feed: *feed,
                        file: file.clone(),
                    });
                }
                StepEffect::SpyUnlocked => {
                    info!("spy view unlocked");
                    self.spy.unlocked = true;
                }
                StepEffect::SpyAnchorReached { level, .. } => {
                    self.spy.anchor_level = Some(*level);
                }
            }
        }
    }

    fn reverse_effects(&mut self, effects: &[StepEffect]) {
        for effect in effects.iter().rev() {
            match effect {
                StepEffect::FeedPostUnlocked { feed, file } => {
                    if let Some(index) = self
                        .feed_posts
                        .iter()
                        .rposition(|post| post.feed == *feed && &post.file == file)
                    {
                        self.feed_posts.remove(index);
                    }
                }
                StepEffect::SpyUnlocked => self.spy.unlocked = false,
                StepEffect::SpyAnchorReached { prior, .. } => self.spy.anchor_level = *prior,
            }
        }
    }
}

fn unknown_conversation(key: &str) -> StoryError {
    StoryError::new(
        "SESSION_UNKNOWN_CONVERSATION",
        format!("Conversation \"{}\" does not exist.", key),
    )
}

struct SessionEnv<'a> {
    unlocked_files: &'a [String],
    feed_posts: &'a [FeedPost],
    spy: &'a SpyState,
    clock_millis: u64,
    lock_tiers: &'a BTreeMap<String, String>,
    verifier: &'a dyn EntitlementVerifier,
}

impl StepEnv for SessionEnv<'_> {
    fn is_unlocked(&self, file: &str) -> bool {
        self.unlocked_files.iter().any(|known| known == file)
    }

    fn lock_satisfied(&self, file: &str) -> bool {
        let tier = self
            .lock_tiers
            .get(file)
            .map(String::as_str)
            .unwrap_or(DEFAULT_LOCK_TIER);
        self.verifier.has_local_credential_for(tier)
    }

    fn has_feed_post(&self, feed: FeedKind, file: &str) -> bool {
        self.feed_posts
            .iter()
            .any(|post| post.feed == feed && post.file == file)
    }

    fn spy_unlocked(&self) -> bool {
        self.spy.unlocked
    }

    fn spy_anchor_level(&self) -> Option<u32> {
        self.spy.anchor_level
    }

    fn clock_millis(&self) -> u64 {
        self.clock_millis
    }
}
