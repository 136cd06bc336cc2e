use super::*;

impl ConversationVm<'_> {
    pub(super) fn latest_deletable_message(&self) -> Option<usize> {
        self.state
            .played_messages
            .iter()
            .rposition(|message| !message.is_deleted() && !message.is_status())
    }

    /// Schedules `target` to vanish `millis` after now. Replay shows the
    /// eventual timeline, so the deletion lands at once there.
    pub(super) fn defer_deletion(
        &mut self,
        target: usize,
        millis: u64,
        position: usize,
        env: &dyn StepEnv,
        mode: StepMode,
    ) {
        if matches!(mode, StepMode::Replay { .. }) {
            self.state.played_messages[target].deleted_at = Some(position);
            return;
        }
        let fires_at = env.clock_millis().saturating_add(millis);
        debug!(target, fires_at, position, "scheduled deletion");
        self.state.pending_deletions.push(ScheduledDeletion {
            target_message: target,
            fires_at,
            position,
        });
    }

    /// A timed `Delete` right after a message belongs to that message; it is
    /// scheduled now and stepped over.
    pub(super) fn attach_following_timed_delete(
        &mut self,
        message_index: usize,
        env: &dyn StepEnv,
        mode: StepMode,
    ) {
        let position = self.state.program_counter;
        let Some(Instruction::Delete {
            timer_millis: Some(millis),
        }) = self.program.instruction(position)
        else {
            return;
        };
        if *millis == 0 {
            return;
        }
        let millis = *millis;
        self.defer_deletion(message_index, millis, position, env, mode);
        self.state.program_counter += 1;
    }

    pub fn fire_due_deletions(&mut self, now: u64) -> Vec<usize> {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .state
            .pending_deletions
            .drain(..)
            .partition(|deletion| deletion.fires_at <= now);
        self.state.pending_deletions = waiting;

        let mut fired = Vec::new();
        for deletion in due {
            let Some(message) = self.state.played_messages.get_mut(deletion.target_message) else {
                warn!(
                    target = deletion.target_message,
                    "scheduled deletion points past the timeline"
                );
                continue;
            };
            if message.deleted_at.is_none() {
                message.deleted_at = Some(deletion.position);
                fired.push(deletion.target_message);
            }
        }
        fired
    }

    /// Cancels deletions scheduled at or after `position` and restores
    /// messages they already removed.
    pub(super) fn unwind_deletions_from(&mut self, position: usize) {
        let before = self.state.pending_deletions.len();
        self.state
            .pending_deletions
            .retain(|deletion| deletion.position < position);
        let cancelled = before - self.state.pending_deletions.len();

        let mut restored = 0usize;
        for message in &mut self.state.played_messages {
            if message.deleted_at.is_some_and(|at| at >= position) {
                message.deleted_at = None;
                restored += 1;
            }
        }
        if cancelled > 0 || restored > 0 {
            debug!(position, cancelled, restored, "unwound deletions");
        }
    }
}
