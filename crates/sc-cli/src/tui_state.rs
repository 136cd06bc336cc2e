use crate::{choice_lines, narrate, BoundaryEvent, BoundaryResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChoiceRow {
    pub(crate) id: String,
    pub(crate) text: String,
}

#[derive(Debug, Default)]
pub(crate) struct TuiUiState {
    pub(crate) viewing: String,
    pub(crate) rendered_lines: Vec<String>,
    pub(crate) pending_lines: Vec<String>,
    pub(crate) typing_line: Option<String>,
    pub(crate) typing_chars: usize,
    pub(crate) event: Option<BoundaryEvent>,
    pub(crate) choices: Vec<ChoiceRow>,
    pub(crate) choice_block: Option<usize>,
    pub(crate) locked_file: Option<String>,
    pub(crate) code_buffer: String,
    pub(crate) selected_choice_index: usize,
    pub(crate) choice_scroll_offset: usize,
    pub(crate) help_visible: bool,
    pub(crate) status: String,
}

impl TuiUiState {
    pub(crate) fn typing_in_progress(&self) -> bool {
        self.typing_line.is_some() || !self.pending_lines.is_empty()
    }

    pub(crate) fn ended(&self) -> bool {
        self.event == Some(BoundaryEvent::End)
    }

    pub(crate) fn code_entry(&self) -> bool {
        self.event == Some(BoundaryEvent::Locked)
    }

    pub(crate) fn set_boundary_state(&mut self, boundary: &BoundaryResult) {
        self.event = Some(boundary.event);
        self.choices = boundary
            .choices
            .iter()
            .map(|(id, text)| ChoiceRow {
                id: id.clone(),
                text: text.clone(),
            })
            .collect();
        self.choice_block = boundary.choice_block;
        self.locked_file = boundary.locked_file.clone();
        if boundary.event != BoundaryEvent::Locked {
            self.code_buffer.clear();
        }
        self.selected_choice_index = 0;
        self.choice_scroll_offset = 0;
    }

    pub(crate) fn append_boundary(&mut self, boundary: BoundaryResult) {
        self.pending_lines.extend(narrate(&boundary));
        self.set_boundary_state(&boundary);
    }

    /// Clears the transcript and shows `boundary` from scratch, without typing.
    pub(crate) fn replace_boundary(&mut self, boundary: BoundaryResult) {
        self.rendered_lines = narrate(&boundary);
        self.pending_lines.clear();
        self.typing_line = None;
        self.typing_chars = 0;
        self.viewing = boundary.conversation.clone();
        self.set_boundary_state(&boundary);
    }

    pub(crate) fn advance_typewriter(&mut self) -> bool {
        let Some(line) = self.typing_line.as_ref() else {
            if self.pending_lines.is_empty() {
                return false;
            }
            let next_line = self.pending_lines.remove(0);
            if next_line.is_empty() {
                self.rendered_lines.push(next_line);
                return true;
            }
            self.typing_line = Some(next_line);
            self.typing_chars = 1;
            return true;
        };

        if self.typing_chars >= line.chars().count() {
            self.rendered_lines.push(line.clone());
            self.typing_line = None;
            self.typing_chars = 0;
            return true;
        }
        self.typing_chars += 1;
        true
    }

    pub(crate) fn skip_typewriter(&mut self) {
        if let Some(line) = self.typing_line.take() {
            self.rendered_lines.push(line);
        }
        self.rendered_lines.append(&mut self.pending_lines);
        self.typing_chars = 0;
    }

    pub(crate) fn choice_summary(&self) -> Vec<String> {
        let mut boundary = BoundaryResult::new(
            self.event.unwrap_or(BoundaryEvent::Message),
            &self.viewing,
        );
        boundary.choices = self
            .choices
            .iter()
            .map(|row| (row.id.clone(), row.text.clone()))
            .collect();
        choice_lines(&boundary)
    }
}

#[cfg(test)]
mod tui_state_tests {
    use super::*;

    fn fake_choices() -> BoundaryResult {
        let mut boundary = BoundaryResult::new(BoundaryEvent::FakeChoices, "amy");
        boundary.choices = vec![
            ("0".to_string(), "yeah".to_string()),
            ("1".to_string(), "can't sleep".to_string()),
        ];
        boundary.choice_block = Some(0);
        boundary.thinking.push("hmm".to_string());
        boundary
    }

    #[test]
    fn typewriter_types_pending_lines_one_char_at_a_time() {
        let mut ui = TuiUiState::default();
        ui.append_boundary(fake_choices());
        assert!(ui.typing_in_progress());
        assert_eq!(ui.choices.len(), 2);

        let mut steps = 0;
        while ui.advance_typewriter() {
            steps += 1;
        }
        assert_eq!(steps, "(thinking) hmm".chars().count() + 1);
        assert_eq!(ui.rendered_lines, vec!["(thinking) hmm".to_string()]);
        assert!(!ui.typing_in_progress());
    }

    #[test]
    fn replace_boundary_skips_typing_and_tracks_the_conversation() {
        let mut ui = TuiUiState {
            code_buffer: "GOLD".to_string(),
            ..TuiUiState::default()
        };
        ui.replace_boundary(fake_choices());
        assert_eq!(ui.viewing, "amy");
        assert!(!ui.typing_in_progress());
        assert!(ui.code_buffer.is_empty());
        assert_eq!(ui.choice_summary(), vec!["  [0] yeah", "  [1] can't sleep"]);
    }

    #[test]
    fn locked_boundary_keeps_the_code_buffer_and_skip_flushes() {
        let mut ui = TuiUiState {
            code_buffer: "GOLD".to_string(),
            ..TuiUiState::default()
        };
        let mut locked = BoundaryResult::new(BoundaryEvent::Locked, "zoe");
        locked.locked_file = Some("vip.txt".to_string());
        ui.append_boundary(locked);
        assert!(ui.code_entry());
        assert_eq!(ui.code_buffer, "GOLD");

        ui.advance_typewriter();
        ui.skip_typewriter();
        assert!(!ui.typing_in_progress());
        assert_eq!(
            ui.rendered_lines.last().map(String::as_str),
            Some("locked: vip.txt (enter an access code)")
        );
        assert!(!ui.ended());
    }
}
