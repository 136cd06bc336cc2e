#![cfg(not(coverage))]

use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};
use ratatui::Frame;
use sc_runtime::EngineSession;

use crate::tui_state::TuiUiState;
use crate::LoadedStory;

const CHOICE_VIEWPORT_ROWS: usize = 5;
const ELLIPSIS: &str = "…";

pub(crate) fn render_tui(
    frame: &mut Frame<'_>,
    ui: &TuiUiState,
    story: &LoadedStory,
    session: &EngineSession,
    state_file: &str,
) {
    let terminal_width = frame.area().width as usize;
    let terminal_rows = frame.area().height as usize;
    let content_width = (terminal_width.saturating_sub(2)).max(16);

    let typing_in_progress = ui.typing_in_progress();
    let mut lines = ui.rendered_lines.clone();
    if let Some(typing) = &ui.typing_line {
        lines.push(typing.chars().take(ui.typing_chars).collect());
    }
    let wrapped_text_rows = lines
        .iter()
        .flat_map(|line| wrap_line_to_width(line, content_width))
        .collect::<Vec<_>>();

    let code_mode = !typing_in_progress && ui.code_entry();
    let choice_display_enabled = !typing_in_progress && !code_mode && !ui.choices.is_empty();
    let interaction_header = if code_mode {
        format!(
            "access code for {}:",
            ui.locked_file.as_deref().unwrap_or("locked file")
        )
    } else if choice_display_enabled {
        "choices (up/down + enter):".to_string()
    } else {
        String::new()
    };
    let interaction_header = truncate_to_width(&interaction_header, content_width);

    let mut reserved_rows = 4usize + 1 + CHOICE_VIEWPORT_ROWS + 1 + 1;
    if ui.ended() {
        reserved_rows += 1;
    }
    if ui.help_visible {
        reserved_rows += 1;
    }
    if !interaction_header.is_empty() {
        reserved_rows += 1;
    }
    let visible_text_rows = terminal_rows.saturating_sub(reserved_rows).max(1);
    let skip = wrapped_text_rows.len().saturating_sub(visible_text_rows);
    let clipped_text_rows = wrapped_text_rows.into_iter().skip(skip);

    let choice_text_width = content_width.saturating_sub(2).max(8);
    let visible_choice_rows = (0..CHOICE_VIEWPORT_ROWS)
        .map(|row_index| {
            if code_mode {
                if row_index == 0 {
                    return (truncate_to_width(&ui.code_buffer, choice_text_width), true);
                }
                return (" ".to_string(), false);
            }
            if !choice_display_enabled {
                return (" ".to_string(), false);
            }
            let absolute_index = ui.choice_scroll_offset + row_index;
            let Some(choice) = ui.choices.get(absolute_index) else {
                return (" ".to_string(), false);
            };
            let text = format!("[{}] {}", choice.id, choice.text.replace('\n', " / "));
            (
                truncate_to_width(&text, choice_text_width),
                absolute_index == ui.selected_choice_index,
            )
        })
        .collect::<Vec<_>>();

    let choice_window_text = if choice_display_enabled && ui.choices.len() > CHOICE_VIEWPORT_ROWS
    {
        format!(
            "window {}-{} / {}",
            ui.choice_scroll_offset + 1,
            (ui.choice_scroll_offset + CHOICE_VIEWPORT_ROWS).min(ui.choices.len()),
            ui.choices.len()
        )
    } else {
        " ".to_string()
    };

    let header_text =
        truncate_to_width(&format!("{} | {}", story.title, ui.viewing), content_width);
    let tabs_text = truncate_to_width(&conversation_tabs(session, &ui.viewing), content_width);
    let state_text = truncate_to_width(&format!("state: {}", state_file), content_width);
    let status_text = truncate_to_width(&format!("status: {}", ui.status), content_width);
    let divider_line = "─".repeat(content_width);
    let key_text = truncate_to_width(
        "keys: enter next/choose/submit | up/down move | tab chat | b back | s save | l load | r restart | h help | q quit",
        content_width,
    );
    let help_text = truncate_to_width(
        "* marks a chat with new messages. while a chat is locked, typing goes to the access code.",
        content_width,
    );

    let gray = Style::default().fg(Color::Gray);
    let mut lines_out: Vec<Line<'_>> = Vec::new();
    lines_out.push(Line::from(header_text));
    lines_out.push(Line::from(Span::styled(tabs_text, Style::default().fg(Color::Cyan))));
    lines_out.push(Line::from(Span::styled(state_text, gray)));
    lines_out.push(Line::from(Span::styled(status_text, gray)));
    for row in clipped_text_rows {
        lines_out.push(Line::from(row));
    }
    lines_out.push(Line::from(Span::styled(divider_line, gray)));
    if !interaction_header.is_empty() {
        lines_out.push(Line::from(Span::styled(
            interaction_header,
            Style::default().fg(Color::Cyan),
        )));
    }
    for (text, selected) in visible_choice_rows {
        let prefix = if selected { "> " } else { "  " };
        let style = if selected {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        lines_out.push(Line::from(Span::styled(format!("{}{}", prefix, text), style)));
    }
    lines_out.push(Line::from(Span::styled(choice_window_text, gray)));
    if ui.ended() {
        lines_out.push(Line::from(Span::styled(
            "[end]".to_string(),
            Style::default().fg(Color::Green),
        )));
    }
    lines_out.push(Line::from(Span::styled(
        key_text,
        Style::default().fg(Color::Yellow),
    )));
    if ui.help_visible {
        lines_out.push(Line::from(Span::styled(
            help_text,
            Style::default().fg(Color::Magenta),
        )));
    }

    let paragraph = Paragraph::new(lines_out).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, frame.area());
}

/// `chats: amy* [ben]`, bracketing the viewed one and starring unread ones.
fn conversation_tabs(session: &EngineSession, viewing: &str) -> String {
    let tabs = session
        .conversation_keys()
        .map(|key| {
            let mark = if session.needs_attention(key) { "*" } else { "" };
            if key == viewing {
                format!("[{}{}]", key, mark)
            } else {
                format!("{}{}", key, mark)
            }
        })
        .collect::<Vec<_>>();
    format!("chats: {}", tabs.join(" "))
}

fn truncate_to_width(value: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let chars = value.chars().collect::<Vec<_>>();
    if chars.len() <= width {
        return value.to_string();
    }
    if width == 1 {
        return ELLIPSIS.to_string();
    }
    let mut out = chars.into_iter().take(width - 1).collect::<String>();
    out.push_str(ELLIPSIS);
    out
}

fn wrap_line_to_width(value: &str, width: usize) -> Vec<String> {
    let chars = value.chars().collect::<Vec<_>>();
    if width == 0 || chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
