use super::*;

impl ConversationVm<'_> {
    pub fn select_fake_choice(
        &mut self,
        option_index: usize,
        text: &str,
    ) -> Result<usize, StoryError> {
        let block_index = match (
            self.state.waiting_for_fake_choice,
            self.state.active_fake_choice_index,
        ) {
            (true, Some(block_index)) => block_index,
            _ => {
                return Err(StoryError::new(
                    "ENGINE_NO_PENDING_CHOICE",
                    "No fake choice is pending.",
                ))
            }
        };
        let block = self.program.fake_choices.get(block_index).ok_or_else(|| {
            StoryError::new(
                "ENGINE_CHOICE_BLOCK_MISSING",
                format!("Fake choice block {} no longer exists.", block_index),
            )
        })?;
        if option_index >= block.options.len() {
            return Err(StoryError::new(
                "ENGINE_CHOICE_INDEX",
                format!("Choice index \"{}\" is out of range.", option_index),
            ));
        }
        Ok(self.apply_fake_selection(block_index, text))
    }

    pub fn select_real_choice(
        &mut self,
        block_index: usize,
        label: &str,
        text: &str,
    ) -> Result<usize, StoryError> {
        if !self.state.waiting_for_real_choice {
            return Err(StoryError::new(
                "ENGINE_NO_PENDING_CHOICE",
                "No real choice is pending.",
            ));
        }
        if self.state.active_real_choice_index != Some(block_index) {
            return Err(StoryError::new(
                "ENGINE_CHOICE_BLOCK_MISMATCH",
                format!("Choice block {} is not the one on offer.", block_index),
            ));
        }
        let offered = self
            .program
            .real_choices
            .get(block_index)
            .and_then(|block| block.find_option(label));
        if offered.is_none() {
            return Err(StoryError::new(
                "ENGINE_CHOICE_LABEL",
                format!("Choice block {} has no option \"{}\".", block_index, label),
            ));
        }
        let selection = RealSelection {
            label: label.to_string(),
            text: text.to_string(),
        };
        Ok(self.apply_real_selection(block_index, selection))
    }

    /// Materializes a fake selection exactly as interactive play does.
    pub(super) fn apply_fake_selection(&mut self, block_index: usize, text: &str) -> usize {
        let prior = self.state.registers();
        let message_index = self.append_message(
            DisplayedItem::player_line(text),
            MessageOrigin::FakeChoice { block_index },
        );
        self.state.fake_choices_made.push(text.to_string());
        self.state.waiting_for_fake_choice = false;
        self.state.active_fake_choice_index = None;
        self.state.next_fake_choice_cursor =
            self.state.next_fake_choice_cursor.max(block_index + 1);
        self.push_record(prior, Vec::new(), ActionKind::FakeChoice { block_index });
        self.settle_boundary();
        debug!(block_index, message_index, "fake choice selected");
        message_index
    }

    pub(super) fn apply_real_selection(
        &mut self,
        block_index: usize,
        selection: RealSelection,
    ) -> usize {
        let prior = self.state.registers();
        let message_index = self.append_message(
            DisplayedItem::player_line(selection.text.clone()),
            MessageOrigin::RealChoice {
                block_index,
                label: selection.label.clone(),
            },
        );
        self.state.selected_path = Some(selection.label.clone());
        self.state.real_choices_made.push(selection);
        self.state.waiting_for_real_choice = false;
        self.state.active_real_choice_index = None;
        self.state.next_real_choice_cursor =
            self.state.next_real_choice_cursor.max(block_index + 1);
        if matches!(
            self.program.instruction(self.state.program_counter),
            Some(Instruction::RealChoiceMarker { .. })
        ) {
            self.state.program_counter += 1;
        }
        self.push_record(prior, Vec::new(), ActionKind::RealChoice { block_index });
        self.settle_boundary();
        debug!(block_index, message_index, "real choice selected");
        message_index
    }

    pub fn grant_lock(&mut self) -> Result<String, StoryError> {
        let file = match self.program.instruction(self.state.program_counter) {
            Some(Instruction::Lock { file }) if self.state.waiting_for_lock => file.clone(),
            _ => {
                return Err(StoryError::new(
                    "ENGINE_NO_PENDING_LOCK",
                    "Conversation is not waiting on a lock.",
                ))
            }
        };
        let prior = self.state.registers();
        self.state.waiting_for_lock = false;
        self.state.program_counter += 1;
        self.push_record(
            prior,
            Vec::new(),
            ActionKind::Lock {
                file: file.clone(),
                merge: None,
                switch: None,
            },
        );
        Ok(file)
    }
}
