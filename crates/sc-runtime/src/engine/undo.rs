use super::*;

impl ConversationVm<'_> {
    /// Reverses the most recent action. A pending prompt is dismissed first;
    /// cross-conversation parts of the popped record are left to the caller.
    pub fn go_back(&mut self) -> UndoStep {
        let dismissed = self.state.is_waiting();
        if dismissed {
            self.state.waiting_for_fake_choice = false;
            self.state.active_fake_choice_index = None;
            self.state.waiting_for_real_choice = false;
            self.state.active_real_choice_index = None;
            self.state.waiting_for_lock = false;
        }

        let Some(record) = self.state.action_history.pop() else {
            return if dismissed {
                UndoStep::ClearedWait
            } else {
                UndoStep::Nothing
            };
        };

        match &record.kind {
            ActionKind::Script { message_index } => {
                self.state.played_messages.truncate(*message_index);
            }
            ActionKind::FakeChoice { .. } => {
                self.state.played_messages.pop();
                self.state.fake_choices_made.pop();
            }
            ActionKind::RealChoice { .. } => {
                self.state.played_messages.pop();
                self.state.real_choices_made.pop();
            }
            ActionKind::Delete { target_message } => {
                if let Some(message) = target_message
                    .and_then(|target| self.state.played_messages.get_mut(target))
                {
                    message.deleted_at = None;
                }
            }
            ActionKind::Thinking { .. }
            | ActionKind::Unlock { .. }
            | ActionKind::Lock { .. }
            | ActionKind::ConversationEntry { .. } => {}
        }

        self.state.restore_registers(record.prior.clone());
        self.unwind_deletions_from(self.state.program_counter);
        debug!(
            kind = record.kind.kind_name(),
            pc = self.state.program_counter,
            "undid action"
        );
        UndoStep::Popped(record)
    }

    pub fn mark_entry(&mut self, from_key: Option<String>, file: &str) {
        let prior = self.state.registers();
        self.push_record(
            prior,
            Vec::new(),
            ActionKind::ConversationEntry {
                from_key,
                file: file.to_string(),
            },
        );
    }
}
