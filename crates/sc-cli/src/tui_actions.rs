use std::path::Path;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use sc_core::StoryError;

use crate::tui_state::TuiUiState;
use crate::{
    choose_fake, choose_real, create_run_for_story, go_back, load_run_from_state_for_story,
    next_unfinished, run_to_boundary, save_run_state, submit_code, transcript, BoundaryEvent,
    BoundaryResult, LoadedStory, StoryRun,
};

const CHOICE_VIEWPORT_ROWS: usize = 5;

pub(crate) struct TuiActionContext<'a> {
    pub(crate) state_file: &'a str,
    pub(crate) story: &'a LoadedStory,
}

/// Returns `true` when the player asked to quit.
pub(crate) fn handle_key(
    key: KeyEvent,
    context: &TuiActionContext<'_>,
    run: &mut StoryRun,
    ui: &mut TuiUiState,
) -> Result<bool, StoryError> {
    if key.code == KeyCode::Esc {
        return Ok(true);
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Ok(true);
    }

    let code_entry = ui.code_entry() && !ui.typing_in_progress();
    if code_entry {
        match key.code {
            KeyCode::Char(ch)
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT) =>
            {
                ui.code_buffer.push(ch);
                return Ok(false);
            }
            KeyCode::Backspace | KeyCode::Delete => {
                ui.code_buffer.pop();
                return Ok(false);
            }
            _ => {}
        }
    }

    match key.code {
        KeyCode::Char('q') => return Ok(true),
        KeyCode::Char('h') => {
            ui.help_visible = !ui.help_visible;
            return Ok(false);
        }
        KeyCode::Char('r') => {
            let credentials = run.verifier.credentials();
            *run = create_run_for_story(context.story, credentials)?;
            show_active(run, ui)?;
            ui.status = "restarted".to_string();
            return Ok(false);
        }
        KeyCode::Char('s') => {
            save_run_state(Path::new(context.state_file), run, &context.story.id)?;
            ui.status = format!("saved to {}", context.state_file);
            return Ok(false);
        }
        KeyCode::Char('l') => {
            let (_state, resumed) =
                load_run_from_state_for_story(Path::new(context.state_file), context.story)?;
            *run = resumed;
            show_active(run, ui)?;
            ui.status = format!("loaded from {}", context.state_file);
            return Ok(false);
        }
        KeyCode::Char('b') => {
            let boundary = go_back(run, &ui.viewing)?;
            let undone = boundary.undone == Some(true);
            let key = boundary.conversation.clone();
            ui.replace_boundary(transcript(run.session(), &key));
            ui.status = if undone { "went back" } else { "nothing to undo" }.to_string();
            return Ok(false);
        }
        KeyCode::Tab => {
            let keys = run
                .session()
                .conversation_keys()
                .map(str::to_string)
                .collect::<Vec<_>>();
            let current = keys.iter().position(|key| *key == ui.viewing);
            let next = match current {
                Some(index) => keys.get((index + 1) % keys.len()),
                None => keys.first(),
            };
            if let Some(next) = next.cloned() {
                run.player.session_mut().clear_attention(&next);
                ui.replace_boundary(transcript(run.session(), &next));
                ui.status = format!("viewing {}", next);
            }
            return Ok(false);
        }
        _ => {}
    }

    let typing_in_progress = ui.typing_in_progress();
    match key.code {
        KeyCode::Up => {
            if ui.choices.is_empty() {
                ui.status = "no pending choice".to_string();
                return Ok(false);
            }
            ui.selected_choice_index = ui.selected_choice_index.saturating_sub(1);
            if ui.selected_choice_index < ui.choice_scroll_offset {
                ui.choice_scroll_offset = ui.selected_choice_index;
            }
        }
        KeyCode::Down => {
            if ui.choices.is_empty() {
                ui.status = "no pending choice".to_string();
                return Ok(false);
            }
            let last = ui.choices.len().saturating_sub(1);
            ui.selected_choice_index = (ui.selected_choice_index + 1).min(last);
            if ui.choices.len() > CHOICE_VIEWPORT_ROWS
                && ui.selected_choice_index >= ui.choice_scroll_offset + CHOICE_VIEWPORT_ROWS
            {
                ui.choice_scroll_offset = ui.selected_choice_index - CHOICE_VIEWPORT_ROWS + 1;
            }
        }
        KeyCode::Enter => {
            if typing_in_progress {
                ui.skip_typewriter();
                return Ok(false);
            }
            confirm(run, ui)?;
        }
        _ => {}
    }

    Ok(false)
}

pub(crate) fn advance_viewing(run: &mut StoryRun, ui: &mut TuiUiState) -> Result<(), StoryError> {
    let boundary = run_to_boundary(run, &ui.viewing.clone(), 1)?;
    apply_boundary(run, ui, boundary);
    Ok(())
}

fn confirm(run: &mut StoryRun, ui: &mut TuiUiState) -> Result<(), StoryError> {
    let key = ui.viewing.clone();
    let boundary = match ui.event {
        Some(BoundaryEvent::FakeChoices | BoundaryEvent::RealChoices) => {
            let selected = ui
                .choices
                .get(ui.selected_choice_index)
                .ok_or_else(|| StoryError::new("TUI_CHOICE_PARSE", "No choices available"))?
                .id
                .clone();
            if ui.event == Some(BoundaryEvent::RealChoices) {
                let block = ui.choice_block.unwrap_or_default();
                ui.status = format!("chose {}", selected);
                choose_real(run, &key, block, &selected, None)?
            } else {
                let index = selected.parse::<usize>().map_err(|_| {
                    StoryError::new(
                        "TUI_CHOICE_PARSE",
                        format!("Invalid choice index: {}", selected),
                    )
                })?;
                ui.status = format!("chose {}", index);
                choose_fake(run, &key, index, None)?
            }
        }
        Some(BoundaryEvent::Locked) => {
            if ui.code_buffer.trim().is_empty() {
                ui.status = "enter an access code".to_string();
                return Ok(());
            }
            let code = std::mem::take(&mut ui.code_buffer);
            ui.status = "code submitted".to_string();
            submit_code(run, &key, &code)?
        }
        Some(BoundaryEvent::End) => {
            match next_unfinished(run.session()) {
                Some(next) => {
                    ui.replace_boundary(transcript(run.session(), &next));
                    ui.status = format!("viewing {}", next);
                }
                None => ui.status = "story finished".to_string(),
            }
            return Ok(());
        }
        _ => return advance_viewing(run, ui),
    };
    apply_boundary(run, ui, boundary);
    Ok(())
}

fn apply_boundary(run: &StoryRun, ui: &mut TuiUiState, boundary: BoundaryResult) {
    let switch_to = match (&boundary.event, &boundary.active) {
        (BoundaryEvent::Unlocked, Some(active)) if *active != ui.viewing => Some(active.clone()),
        _ => None,
    };
    ui.append_boundary(boundary);
    if let Some(active) = switch_to {
        ui.skip_typewriter();
        let mut opened = transcript(run.session(), &active);
        opened.messages.clear();
        ui.viewing = active;
        ui.append_boundary(opened);
    }
}

fn show_active(run: &StoryRun, ui: &mut TuiUiState) -> Result<(), StoryError> {
    let key = run.conversation_key(None)?;
    ui.replace_boundary(transcript(run.session(), &key));
    Ok(())
}
