use super::*;

use sc_core::ActionRecord;

use crate::engine::StepReport;

impl EngineSession {
    /// One user action on `key`. Unlock and lock outcomes leave the session
    /// waiting for `ingest_file`/`ingest_missing`.
    pub fn advance(&mut self, key: &str) -> Result<StepOutcome, StoryError> {
        self.require_conversation(key)?;
        if let Some(pending) = &self.pending_unlock {
            return Err(StoryError::new(
                "SESSION_UNLOCK_PENDING",
                format!("Waiting for \"{}\" to load.", pending.file),
            ));
        }
        if let Some(active_key) = self.blocking_conversation(key) {
            debug!(conversation = %key, active = %active_key, "advance blocked");
            return Ok(StepOutcome::Blocked { active_key });
        }

        self.attention.remove(key);
        let report = self.step_conversation(key)?;
        self.apply_effects(&report.effects);
        match &report.outcome {
            StepOutcome::Unlock { file } | StepOutcome::Lock { file } => {
                self.begin_unlock(key, file);
            }
            StepOutcome::WaitingLock { file } => {
                info!(
                    conversation = %key,
                    file = %file,
                    tier = %self.lock_tier(file),
                    "conversation locked"
                );
            }
            _ => {}
        }
        debug!(conversation = %key, outcome = ?report.outcome, "advanced");
        Ok(report.outcome)
    }

    pub fn select_fake_choice(
        &mut self,
        key: &str,
        option_index: usize,
        text: &str,
    ) -> Result<usize, StoryError> {
        self.require_unblocked(key)?;
        self.attention.remove(key);
        self.vm_call(key, |mut vm| vm.select_fake_choice(option_index, text))?
    }

    pub fn select_real_choice(
        &mut self,
        key: &str,
        block_index: usize,
        label: &str,
        text: &str,
    ) -> Result<usize, StoryError> {
        self.require_unblocked(key)?;
        self.attention.remove(key);
        self.vm_call(key, |mut vm| vm.select_real_choice(block_index, label, text))?
    }

    /// Undoes the latest action in `key`, including any unlock cascade it
    /// started. Returns false when there was nothing to undo.
    pub fn go_back(&mut self, key: &str) -> Result<bool, StoryError> {
        let step = self.vm_call(key, |mut vm| vm.go_back())?;
        let changed = !matches!(step, UndoStep::Nothing);
        if let UndoStep::Popped(record) = step {
            self.reverse_record(key, record);
        }
        self.collapse_if_empty(key);
        Ok(changed)
    }

    pub fn tick(&mut self, now_millis: u64) -> Vec<(String, usize)> {
        self.clock_millis = self.clock_millis.max(now_millis);
        let clock = self.clock_millis;
        let empty = Program::default();
        let mut fired = Vec::new();
        for (key, state) in self.conversations.iter_mut() {
            let program = self.registry.program(key).unwrap_or(&empty);
            for target in ConversationVm::new(state, program).fire_due_deletions(clock) {
                debug!(conversation = %key, target, "deletion fired");
                fired.push((key.clone(), target));
            }
        }
        fired
    }

    pub fn auto_advance(
        &mut self,
        key: &str,
        max_steps: usize,
    ) -> Result<Vec<StepOutcome>, StoryError> {
        let mut outcomes = Vec::new();
        for _ in 0..max_steps {
            let outcome = self.advance(key)?;
            let stop = outcome.is_waiting()
                || matches!(
                    outcome,
                    StepOutcome::Finished
                        | StepOutcome::Blocked { .. }
                        | StepOutcome::Unlock { .. }
                        | StepOutcome::Lock { .. }
                );
            outcomes.push(outcome);
            let waiting = self
                .conversations
                .get(key)
                .is_some_and(ConversationState::is_waiting);
            if stop || waiting {
                break;
            }
        }
        Ok(outcomes)
    }

    pub fn blocking_conversation(&self, key: &str) -> Option<String> {
        let active = self.active_conversation.as_deref()?;
        if active == key || self.is_finished(active) {
            return None;
        }
        Some(active.to_string())
    }

    fn require_unblocked(&self, key: &str) -> Result<(), StoryError> {
        self.require_conversation(key)?;
        match self.blocking_conversation(key) {
            Some(active_key) => Err(StoryError::new(
                "SESSION_CONVERSATION_BLOCKED",
                format!(
                    "Conversation \"{}\" waits until \"{}\" is finished.",
                    key, active_key
                ),
            )),
            None => Ok(()),
        }
    }

    fn step_conversation(&mut self, key: &str) -> Result<StepReport, StoryError> {
        let empty = Program::default();
        let Self {
            registry,
            conversations,
            unlocked_files,
            feed_posts,
            spy,
            clock_millis,
            lock_tiers,
            verifier,
            ..
        } = self;
        let program = registry.program(key).unwrap_or(&empty);
        let state = conversations.get_mut(key).ok_or_else(|| unknown_conversation(key))?;
        let env = SessionEnv {
            unlocked_files,
            feed_posts,
            spy,
            clock_millis: *clock_millis,
            lock_tiers,
            verifier: &**verifier,
        };
        Ok(ConversationVm::new(state, program).advance(&env, StepMode::Interactive))
    }

    pub(super) fn vm_call<R>(
        &mut self,
        key: &str,
        call: impl FnOnce(ConversationVm<'_>) -> R,
    ) -> Result<R, StoryError> {
        let empty = Program::default();
        let program = self.registry.program(key).unwrap_or(&empty);
        let state = self
            .conversations
            .get_mut(key)
            .ok_or_else(|| unknown_conversation(key))?;
        Ok(call(ConversationVm::new(state, program)))
    }

    pub(super) fn reverse_record(&mut self, key: &str, record: ActionRecord) {
        self.reverse_effects(&record.effects);
        match record.kind {
            ActionKind::Unlock {
                file,
                merge,
                switch,
            }
            | ActionKind::Lock {
                file,
                merge,
                switch,
            } => self.undo_unlock(&file, merge, switch),
            ActionKind::ConversationEntry { from_key, file } => {
                self.undo_entry(key, from_key, &file);
            }
            ActionKind::Script { .. }
            | ActionKind::FakeChoice { .. }
            | ActionKind::RealChoice { .. }
            | ActionKind::Delete { .. }
            | ActionKind::Thinking { .. } => {}
        }
    }
}
