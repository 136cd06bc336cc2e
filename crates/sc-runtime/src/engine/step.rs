use super::*;

impl ConversationVm<'_> {
    pub fn advance(&mut self, env: &dyn StepEnv, mode: StepMode) -> StepReport {
        if let Some(outcome) = self.current_wait() {
            return StepReport {
                outcome,
                effects: Vec::new(),
            };
        }

        let program = self.program;
        let prior = self.state.registers();
        let mut effects = Vec::new();
        let replaying = matches!(mode, StepMode::Replay { .. });

        for _ in 0..STEP_GUARD {
            if let Some(outcome) = self.raise_due_fake_choice() {
                return self.stop_without_record(outcome, effects);
            }

            let pc = self.state.program_counter;
            if let StepMode::Replay { stop_at } = mode {
                if pc >= stop_at {
                    return self.stop_without_record(StepOutcome::Finished, effects);
                }
            }
            let Some(instruction) = program.instruction(pc) else {
                return self.stop_without_record(StepOutcome::Finished, effects);
            };
            trace!(pc, kind = instruction.kind_name(), "dispatch");

            match instruction {
                Instruction::RealChoiceMarker { block_index } => {
                    let offered = program
                        .real_choices
                        .get(*block_index)
                        .is_some_and(|block| !block.options.is_empty());
                    if offered {
                        self.state.waiting_for_real_choice = true;
                        self.state.active_real_choice_index = Some(*block_index);
                        let outcome = StepOutcome::WaitingRealChoice {
                            block_index: *block_index,
                        };
                        return self.stop_without_record(outcome, effects);
                    }
                    self.state.program_counter += 1;
                }
                Instruction::PathStart { label } => {
                    self.state.program_counter += 1;
                    if self.state.selected_path.as_deref() != Some(label.as_str()) {
                        self.skip_path_block();
                    }
                }
                Instruction::PathEnd => {
                    self.state.selected_path = None;
                    self.state.program_counter += 1;
                }
                Instruction::Unlock { file } => {
                    self.state.program_counter += 1;
                    if replaying || env.is_unlocked(file) {
                        continue;
                    }
                    let kind = ActionKind::Unlock {
                        file: file.clone(),
                        merge: None,
                        switch: None,
                    };
                    self.push_record(prior, effects.clone(), kind);
                    return StepReport {
                        outcome: StepOutcome::Unlock { file: file.clone() },
                        effects,
                    };
                }
                Instruction::Lock { file } => {
                    if replaying || env.is_unlocked(file) {
                        self.state.program_counter += 1;
                        continue;
                    }
                    if env.lock_satisfied(file) {
                        self.state.program_counter += 1;
                        let kind = ActionKind::Lock {
                            file: file.clone(),
                            merge: None,
                            switch: None,
                        };
                        self.push_record(prior, effects.clone(), kind);
                        return StepReport {
                            outcome: StepOutcome::Lock { file: file.clone() },
                            effects,
                        };
                    }
                    self.state.waiting_for_lock = true;
                    let outcome = StepOutcome::WaitingLock { file: file.clone() };
                    return self.stop_without_record(outcome, effects);
                }
                Instruction::UnlockFeedPost { feed, file } => {
                    let effect = StepEffect::FeedPostUnlocked {
                        feed: *feed,
                        file: file.clone(),
                    };
                    if !replaying && !env.has_feed_post(*feed, file) && !effects.contains(&effect)
                    {
                        effects.push(effect);
                    }
                    self.state.program_counter += 1;
                }
                Instruction::SpyUnlock => {
                    let effect = StepEffect::SpyUnlocked;
                    if !replaying && !env.spy_unlocked() && !effects.contains(&effect) {
                        effects.push(effect);
                    }
                    self.state.program_counter += 1;
                }
                Instruction::SpyAnchor { level } => {
                    if !replaying {
                        let current = effects
                            .iter()
                            .rev()
                            .find_map(|effect| match effect {
                                StepEffect::SpyAnchorReached { level, .. } => Some(*level),
                                _ => None,
                            })
                            .or_else(|| env.spy_anchor_level());
                        if current != Some(*level) {
                            effects.push(StepEffect::SpyAnchorReached {
                                level: *level,
                                prior: current,
                            });
                        }
                    }
                    self.state.program_counter += 1;
                }
                Instruction::Thinking { blocks } => {
                    let next = self
                        .state
                        .active_thinking_block
                        .as_ref()
                        .map(|reveal| reveal.block_index + 1)
                        .unwrap_or(0);
                    let Some(text) = blocks.get(next) else {
                        self.state.active_thinking_block = None;
                        self.state.program_counter += 1;
                        continue;
                    };
                    self.state.active_thinking_block = Some(ThinkingReveal {
                        text: text.clone(),
                        block_index: next,
                        total_blocks: blocks.len(),
                    });
                    let kind = ActionKind::Thinking { block_index: next };
                    self.push_record(prior, effects.clone(), kind);
                    return StepReport {
                        outcome: StepOutcome::Thinking {
                            block_index: next,
                            total_blocks: blocks.len(),
                        },
                        effects,
                    };
                }
                Instruction::Delete { timer_millis } => {
                    let target = self.latest_deletable_message();
                    match timer_millis.filter(|millis| *millis > 0) {
                        Some(millis) => {
                            if let Some(target) = target {
                                self.defer_deletion(target, millis, pc, env, mode);
                            } else {
                                warn!(pc, "timed delete with nothing to delete");
                            }
                            self.state.program_counter += 1;
                        }
                        None => {
                            let Some(target) = target else {
                                warn!(pc, "delete with nothing to delete");
                                self.state.program_counter += 1;
                                continue;
                            };
                            self.state.played_messages[target].deleted_at = Some(pc);
                            self.state.program_counter += 1;
                            self.push_record(
                                prior,
                                effects.clone(),
                                ActionKind::Delete {
                                    target_message: Some(target),
                                },
                            );
                            self.settle_boundary();
                            return StepReport {
                                outcome: StepOutcome::Deleted {
                                    target_message: Some(target),
                                },
                                effects,
                            };
                        }
                    }
                }
                Instruction::Talk { .. }
                | Instruction::Image { .. }
                | Instruction::Video { .. }
                | Instruction::Audio { .. }
                | Instruction::Status { .. } => {
                    let Some(item) = displayed_item(instruction) else {
                        self.state.program_counter += 1;
                        continue;
                    };
                    let is_status = matches!(item, DisplayedItem::Status { .. });
                    let message_index = self.append_message(
                        item,
                        MessageOrigin::Script {
                            instruction_index: pc,
                        },
                    );
                    self.state.program_counter += 1;
                    if !is_status {
                        self.attach_following_timed_delete(message_index, env, mode);
                    }
                    self.push_record(
                        prior,
                        effects.clone(),
                        ActionKind::Script { message_index },
                    );
                    self.settle_boundary();
                    debug!(pc, message_index, "displayed message");
                    return StepReport {
                        outcome: StepOutcome::Displayed { message_index },
                        effects,
                    };
                }
            }
        }

        warn!(
            pc = self.state.program_counter,
            "step guard exceeded, treating conversation as finished"
        );
        self.stop_without_record(StepOutcome::Finished, effects)
    }

    pub fn current_wait(&self) -> Option<StepOutcome> {
        if self.state.waiting_for_fake_choice {
            return Some(StepOutcome::WaitingFakeChoice {
                block_index: self
                    .state
                    .active_fake_choice_index
                    .unwrap_or(self.state.next_fake_choice_cursor),
            });
        }
        if self.state.waiting_for_real_choice {
            return Some(StepOutcome::WaitingRealChoice {
                block_index: self
                    .state
                    .active_real_choice_index
                    .unwrap_or(self.state.next_real_choice_cursor),
            });
        }
        if self.state.waiting_for_lock {
            let file = match self.program.instruction(self.state.program_counter) {
                Some(Instruction::Lock { file }) => file.clone(),
                _ => String::new(),
            };
            return Some(StepOutcome::WaitingLock { file });
        }
        None
    }

    fn stop_without_record(
        &mut self,
        outcome: StepOutcome,
        effects: Vec<StepEffect>,
    ) -> StepReport {
        self.carry_effects(effects.clone());
        StepReport { outcome, effects }
    }

    /// Raises the fake-choice prompt when a block is due; empty blocks are
    /// consumed silently.
    fn raise_due_fake_choice(&mut self) -> Option<StepOutcome> {
        while let Some(block_index) = self.due_fake_block() {
            if self.program.fake_choices[block_index].options.is_empty() {
                self.state.next_fake_choice_cursor += 1;
                continue;
            }
            self.state.waiting_for_fake_choice = true;
            self.state.active_fake_choice_index = Some(block_index);
            return Some(StepOutcome::WaitingFakeChoice { block_index });
        }
        None
    }

    /// Called after a stop: a choice sitting right at the counter is offered
    /// immediately instead of on the next advance.
    pub(super) fn settle_boundary(&mut self) {
        if self.raise_due_fake_choice().is_some() {
            return;
        }
        let program = self.program;
        if let Some(Instruction::RealChoiceMarker { block_index }) =
            program.instruction(self.state.program_counter)
        {
            let offered = program
                .real_choices
                .get(*block_index)
                .is_some_and(|block| !block.options.is_empty());
            if offered {
                self.state.waiting_for_real_choice = true;
                self.state.active_real_choice_index = Some(*block_index);
            }
        }
    }

    /// Moves the counter past the `PathEnd` matching an already consumed
    /// `PathStart`, dropping the fake choices that sit inside the skipped branch.
    fn skip_path_block(&mut self) {
        let program = self.program;
        let start = self.state.program_counter;
        let mut depth = 1usize;
        while let Some(instruction) = program.instruction(self.state.program_counter) {
            self.state.program_counter += 1;
            match instruction {
                Instruction::PathStart { .. } => depth += 1,
                Instruction::PathEnd => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = self.state.program_counter;
        while program
            .fake_choices
            .get(self.state.next_fake_choice_cursor)
            .is_some_and(|block| (start..end).contains(&block.message_index))
        {
            self.state.next_fake_choice_cursor += 1;
        }
    }
}
