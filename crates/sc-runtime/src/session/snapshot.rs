use super::*;

use sc_core::{ConversationSave, SessionSave, SESSION_SAVE_SCHEMA};

use crate::engine::replay_to_state;

impl EngineSession {
    /// Decisions and global unlock state only; timelines are rebuilt on restore.
    pub fn save(&self) -> SessionSave {
        SessionSave {
            schema_version: SESSION_SAVE_SCHEMA.to_string(),
            story_id: self.story_id.clone(),
            unlocked_files: self.unlocked_files.clone(),
            parsed_files: self.parsed_files.clone(),
            active_conversation: self.active_conversation.clone(),
            entry_stack: self.entry_stack.clone(),
            conversation_source_files: self.conversation_source_files.clone(),
            conversations: self
                .conversations
                .iter()
                .map(|(key, state)| (key.clone(), ConversationSave::from(state)))
                .collect(),
            feed_posts: self.feed_posts.clone(),
            spy: self.spy.clone(),
            attention: self.attention.iter().cloned().collect(),
            clock_millis: self.clock_millis,
            pending_unlock: self.pending_unlock.clone(),
        }
    }

    /// Re-parses every saved file from `texts` in its original order, then
    /// replays each conversation to its saved position.
    pub fn restore(
        &mut self,
        save: SessionSave,
        texts: &BTreeMap<String, String>,
    ) -> Result<(), StoryError> {
        if save.schema_version != SESSION_SAVE_SCHEMA {
            return Err(StoryError::new(
                "SNAPSHOT_SCHEMA",
                format!(
                    "Unsupported save schema \"{}\", expected \"{}\".",
                    save.schema_version, SESSION_SAVE_SCHEMA
                ),
            ));
        }
        if !self.story_id.is_empty() && save.story_id != self.story_id {
            return Err(StoryError::new(
                "SNAPSHOT_STORY_MISMATCH",
                format!(
                    "Save belongs to story \"{}\", not \"{}\".",
                    save.story_id, self.story_id
                ),
            ));
        }

        self.clear_runtime();
        self.story_id = save.story_id;
        for file in &save.parsed_files {
            match texts.get(file) {
                Some(text) => {
                    self.parse_and_register(file, text);
                }
                None => warn!(file = %file, "saved script text is missing"),
            }
        }
        self.unlocked_files = save.unlocked_files;
        self.active_conversation = save.active_conversation;
        self.entry_stack = save.entry_stack;
        self.conversation_source_files = save.conversation_source_files;
        self.feed_posts = save.feed_posts;
        self.spy = save.spy;
        self.attention = save.attention.into_iter().collect();
        self.clock_millis = save.clock_millis;
        self.pending_unlock = save.pending_unlock;

        let empty = Program::default();
        for (key, saved) in save.conversations {
            let program = self.registry.program(&key).unwrap_or(&empty);
            let mut state = replay_to_state(
                program,
                saved.program_counter,
                &saved.fake_choices_made,
                &saved.real_choices_made,
                saved.selected_path.as_deref(),
            );
            state.restore_registers(saved.registers());
            state.fake_choices_made = saved.fake_choices_made;
            state.real_choices_made = saved.real_choices_made;
            state.action_history = saved.action_history;
            debug!(
                conversation = %key,
                pc = state.program_counter,
                messages = state.played_messages.len(),
                "conversation restored"
            );
            self.conversations.insert(key, state);
        }
        let missing: Vec<String> = self
            .registry
            .keys()
            .filter(|key| !self.conversations.contains_key(*key))
            .map(str::to_string)
            .collect();
        for key in missing {
            self.conversations.insert(key, ConversationState::default());
        }
        info!(
            story = %self.story_id,
            conversations = self.conversations.len(),
            "session restored"
        );
        Ok(())
    }

    pub fn reload_sources(&mut self, texts: &BTreeMap<String, String>) -> Result<(), StoryError> {
        let save = self.save();
        self.restore(save, texts)
    }

    pub fn reset_story(&mut self, story_id: &str) {
        self.clear_runtime();
        self.story_id = story_id.to_string();
        info!(story = %story_id, "story reset");
    }

    pub(super) fn clear_runtime(&mut self) {
        self.registry.clear();
        self.conversations.clear();
        self.unlocked_files.clear();
        self.parsed_files.clear();
        self.active_conversation = None;
        self.entry_stack.clear();
        self.conversation_source_files.clear();
        self.feed_posts.clear();
        self.spy = SpyState::default();
        self.attention.clear();
        self.clock_millis = 0;
        self.pending_unlock = None;
        self.diagnostics.clear();
    }
}
