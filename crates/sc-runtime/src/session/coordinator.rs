use super::*;

use sc_compiler::{normalize_virtual_path, RegisteredFile};

impl EngineSession {
    pub fn start(&mut self, entry_file: &str, text: &str) -> Result<String, StoryError> {
        self.clear_runtime();
        let file = normalize_virtual_path(entry_file);
        self.mark_unlocked(&file);
        let registered = self.parse_and_register(&file, text).ok_or_else(|| {
            StoryError::new(
                "SESSION_ENTRY_EMPTY",
                format!("Entry script \"{}\" declares no participant.", file),
            )
        })?;
        let key = registered.key;
        self.conversations.entry(key.clone()).or_default();
        self.active_conversation = Some(key.clone());
        self.attention.insert(key.clone());
        info!(story = %self.story_id, conversation = %key, file = %file, "story started");
        Ok(key)
    }

    /// Content for the pending unlock arrived. Merges it into its
    /// conversation and switches to that conversation when it is a new one.
    pub fn ingest_file(&mut self, file: &str, text: &str) -> Result<UnlockReceipt, StoryError> {
        let file = normalize_virtual_path(file);
        let pending = self.take_pending(&file)?;
        let Some(registered) = self.parse_and_register(&file, text) else {
            info!(file = %file, "unlocked file has no participants");
            return Ok(UnlockReceipt {
                file,
                key: None,
                switched: false,
            });
        };

        let key = registered.key;
        let merge = MergeMark {
            key: key.clone(),
            before: registered.before,
        };
        let enters = key != pending.from_key
            && self.active_conversation.as_deref() != Some(key.as_str());
        let switch = if enters {
            let target_prior = self.conversations.get(&key).cloned().map(Box::new);
            let prior_active = self.active_conversation.replace(key.clone());
            self.entry_stack.push(EntryFrame {
                key: pending.from_key.clone(),
                triggering_file: file.clone(),
            });
            self.conversations.entry(key.clone()).or_default();
            let from_key = pending.from_key.clone();
            self.vm_call(&key, |mut vm| vm.mark_entry(Some(from_key), &file))?;
            info!(
                from = %pending.from_key,
                to = %key,
                file = %file,
                "conversation switched"
            );
            Some(ConversationSwitch {
                prior_active,
                target_key: key.clone(),
                target_prior,
            })
        } else {
            self.conversations.entry(key.clone()).or_default();
            None
        };

        self.attention.insert(key.clone());
        self.record_merge(&pending.from_key, &file, merge, switch);
        Ok(UnlockReceipt {
            file,
            key: Some(key),
            switched: enters,
        })
    }

    /// The pending unlock's file could not be loaded. It stays unlocked so
    /// the conversation moves on.
    pub fn ingest_missing(&mut self, file: &str) -> Result<(), StoryError> {
        let file = normalize_virtual_path(file);
        let pending = self.take_pending(&file)?;
        warn!(
            conversation = %pending.from_key,
            file = %file,
            "unlocked file could not be loaded"
        );
        Ok(())
    }

    pub(super) fn begin_unlock(&mut self, from_key: &str, file: &str) {
        self.mark_unlocked(file);
        info!(conversation = %from_key, file = %file, "unlock requested");
        self.pending_unlock = Some(PendingUnlock {
            from_key: from_key.to_string(),
            file: file.to_string(),
        });
    }

    /// Parses `file` and merges it into the registry. The conversation
    /// state is left to the caller.
    pub(super) fn parse_and_register(&mut self, file: &str, text: &str) -> Option<RegisteredFile> {
        let parsed = parse_script(text, file, &self.names);
        self.diagnostics.extend(
            parsed
                .diagnostics
                .iter()
                .map(|diagnostic| (file.to_string(), diagnostic.clone())),
        );
        if !self.parsed_files.iter().any(|known| known == file) {
            self.parsed_files.push(file.to_string());
        }
        let registered = self.registry.register(parsed)?;
        let sources = self
            .conversation_source_files
            .entry(registered.key.clone())
            .or_default();
        if !sources.iter().any(|known| known == file) {
            sources.push(file.to_string());
        }
        Some(registered)
    }

    pub(super) fn mark_unlocked(&mut self, file: &str) {
        if !self.is_unlocked(file) {
            self.unlocked_files.push(file.to_string());
        }
    }

    fn take_pending(&mut self, file: &str) -> Result<PendingUnlock, StoryError> {
        match self.pending_unlock.take() {
            Some(pending) if pending.file == file => Ok(pending),
            other => {
                self.pending_unlock = other;
                Err(StoryError::new(
                    "SESSION_NO_PENDING_UNLOCK",
                    format!("No unlock is waiting for \"{}\".", file),
                ))
            }
        }
    }

    fn record_merge(
        &mut self,
        from_key: &str,
        file: &str,
        mark: MergeMark,
        conversation_switch: Option<ConversationSwitch>,
    ) {
        let Some(state) = self.conversations.get_mut(from_key) else {
            warn!(conversation = %from_key, file = %file, "unlock source conversation is gone");
            return;
        };
        let slot = state
            .action_history
            .iter_mut()
            .rev()
            .find_map(|record| match &mut record.kind {
                ActionKind::Unlock {
                    file: target,
                    merge,
                    switch,
                }
                | ActionKind::Lock {
                    file: target,
                    merge,
                    switch,
                } if target.as_str() == file && merge.is_none() => Some((merge, switch)),
                _ => None,
            });
        match slot {
            Some((merge, switch)) => {
                *merge = Some(mark);
                *switch = conversation_switch;
            }
            None => warn!(
                conversation = %from_key,
                file = %file,
                "no unlock record to attach the merge to"
            ),
        }
    }

    /// Reverses everything `ingest_file` did for `file`.
    pub(super) fn undo_unlock(
        &mut self,
        file: &str,
        merge: Option<MergeMark>,
        conversation_switch: Option<ConversationSwitch>,
    ) {
        self.unlocked_files.retain(|known| known != file);
        self.parsed_files.retain(|known| known != file);
        self.diagnostics.retain(|(source, _)| source != file);
        for sources in self.conversation_source_files.values_mut() {
            sources.retain(|known| known != file);
        }
        if self
            .pending_unlock
            .as_ref()
            .is_some_and(|pending| pending.file == file)
        {
            self.pending_unlock = None;
        }

        let dropped = merge
            .as_ref()
            .is_some_and(|merge| self.registry.truncate(&merge.key, &merge.before));

        match conversation_switch {
            Some(switch) => {
                if let Some(index) = self
                    .entry_stack
                    .iter()
                    .rposition(|frame| frame.triggering_file == file)
                {
                    self.entry_stack.remove(index);
                }
                if self.active_conversation.as_deref() == Some(switch.target_key.as_str()) {
                    self.active_conversation = switch.prior_active.clone();
                }
                let target = switch.target_key;
                match switch.target_prior {
                    Some(prior) => {
                        self.conversations.insert(target.clone(), *prior);
                    }
                    None if dropped || !self.registry.contains(&target) => {
                        self.drop_conversation(&target);
                    }
                    None => {
                        self.conversations.insert(target.clone(), ConversationState::default());
                    }
                }
                info!(
                    file = %file,
                    conversation = %target,
                    active = ?self.active_conversation,
                    "unlock undone with switch"
                );
            }
            None => {
                if let Some(merge) = merge.filter(|_| dropped) {
                    self.drop_conversation(&merge.key);
                }
                info!(file = %file, "unlock undone");
            }
        }
    }

    /// The entry record of `key` was popped. When the predecessor's last
    /// action is the unlock that caused the entry, that unlock is undone too.
    pub(super) fn undo_entry(&mut self, key: &str, from_key: Option<String>, file: &str) {
        let Some(from_key) = from_key else {
            return;
        };
        let unlock_on_top = self
            .conversations
            .get(&from_key)
            .and_then(|state| state.action_history.last())
            .is_some_and(|record| match &record.kind {
                ActionKind::Unlock { file: target, .. } | ActionKind::Lock { file: target, .. } => {
                    target == file
                }
                _ => false,
            });
        if unlock_on_top {
            if let Ok(UndoStep::Popped(record)) = self.vm_call(&from_key, |mut vm| vm.go_back()) {
                self.reverse_record(&from_key, record);
            }
            return;
        }
        self.leave_conversation(key, &from_key, file);
    }

    fn leave_conversation(&mut self, key: &str, from_key: &str, file: &str) {
        if let Some(index) = self
            .entry_stack
            .iter()
            .rposition(|frame| frame.triggering_file == file)
        {
            self.entry_stack.remove(index);
        }
        if self.active_conversation.as_deref() == Some(key) {
            self.active_conversation = Some(from_key.to_string());
        }
        debug!(conversation = %key, back_to = %from_key, "left entered conversation");
    }

    /// An emptied active conversation hands control back to its predecessor.
    /// It is deleted only when it no longer has a program of its own.
    pub(super) fn collapse_if_empty(&mut self, key: &str) {
        let empty = self
            .conversations
            .get(key)
            .is_some_and(ConversationState::is_empty);
        if !empty || self.active_conversation.as_deref() != Some(key) {
            return;
        }
        let Some(frame) = self.entry_stack.pop() else {
            return;
        };
        self.active_conversation = Some(frame.key.clone());
        if !self.registry.contains(key) {
            self.drop_conversation(key);
        }
        info!(conversation = %key, back_to = %frame.key, "collapsed empty conversation");
    }

    fn drop_conversation(&mut self, key: &str) {
        self.conversations.remove(key);
        self.registry.remove(key);
        self.conversation_source_files.remove(key);
        self.attention.remove(key);
        debug!(conversation = %key, "conversation removed");
    }
}
