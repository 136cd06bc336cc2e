use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

use sc_core::StoryError;
use sc_runtime::{CredentialOutcome, EngineSession};

use crate::{
    choose_fake, choose_real, create_run_for_story, describe_position, go_back,
    load_run_from_state_for_story, map_tui_io, run_to_boundary, save_run_state, submit_code,
    BoundaryEvent, BoundaryResult, LoadedStory, MessageView, PlayClock, StoryRun,
    TuiCommandAction, TuiCommandContext,
};

pub(crate) const LINE_COMMANDS: &str =
    "commands: :help :save :load :back :restart :list :open <key> :quit";

pub(crate) fn run_play_line_mode(
    state_file: &str,
    story: &LoadedStory,
    run: &mut StoryRun,
) -> Result<i32, StoryError> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut writer = io::stdout();
    run_play_line_mode_with_io(state_file, story, run, &mut reader, &mut writer)
}

pub(crate) fn run_play_line_mode_with_io(
    state_file: &str,
    story: &LoadedStory,
    run: &mut StoryRun,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Result<i32, StoryError> {
    let banner = [format!("storychat: {}", story.title), LINE_COMMANDS.to_string()];
    write_lines(writer, &banner)?;
    let context = TuiCommandContext { state_file, story };
    let mut clock = PlayClock::start(run.session().clock_millis());
    let mut viewing = run.conversation_key(None)?;
    let mut boundary = transcript(run.session(), &viewing);
    let mut show = true;

    loop {
        if show {
            write_lines(writer, &narrate(&boundary))?;
            write_lines(writer, &choice_lines(&boundary))?;
        }
        show = true;
        if boundary.event == BoundaryEvent::End {
            match next_unfinished(run.session()) {
                Some(next) => {
                    write_lines(writer, &[format!("switching to {}", next)])?;
                    viewing = next;
                    boundary = transcript(run.session(), &viewing);
                    continue;
                }
                None => {
                    write_lines(writer, &["[END]".to_string()])?;
                    return Ok(0);
                }
            }
        }

        let Some(raw) = prompt_input_from("> ", reader, writer)? else {
            return Ok(0);
        };
        for (key, index) in run.player.session_mut().tick(clock.now()) {
            write_lines(writer, &[format!("({} deleted message {})", key, index)])?;
        }

        let mut emitted = Vec::new();
        let mut emit = |line: String| emitted.push(line);
        let action = handle_line_cmd(raw.as_str(), &context, run, &mut viewing, &mut emit)?;
        write_lines(writer, &emitted)?;
        match action {
            TuiCommandAction::Continue => {
                show = false;
                continue;
            }
            TuiCommandAction::RefreshBoundary => {
                clock = PlayClock::start(run.session().clock_millis());
                boundary = transcript(run.session(), &viewing);
                continue;
            }
            TuiCommandAction::Quit => return Ok(0),
            TuiCommandAction::NotHandled => {}
        }

        boundary = match apply_line_input(run, &viewing, &boundary, raw.trim()) {
            Ok(next) => next,
            Err(error) => {
                write_lines(writer, &[format!("error: {}", error.message)])?;
                show = false;
                continue;
            }
        };
        if let Some(active) = &boundary.active {
            if boundary.event == BoundaryEvent::Unlocked && active != &viewing {
                viewing = active.clone();
            }
        }
    }
}

pub(crate) fn apply_line_input(
    run: &mut StoryRun,
    key: &str,
    boundary: &BoundaryResult,
    raw: &str,
) -> Result<BoundaryResult, StoryError> {
    match boundary.event {
        BoundaryEvent::FakeChoices => {
            let index = raw.parse::<usize>().map_err(|_| {
                StoryError::new("TUI_CHOICE_PARSE", format!("Invalid choice index: {}", raw))
            })?;
            choose_fake(run, key, index, None)
        }
        BoundaryEvent::RealChoices => {
            let block = boundary.choice_block.unwrap_or_default();
            let label = raw.to_uppercase();
            if !boundary.choices.iter().any(|(id, _)| *id == label) {
                return Err(StoryError::new(
                    "TUI_CHOICE_PARSE",
                    format!("Invalid choice label: {}", raw),
                ));
            }
            choose_real(run, key, block, &label, None)
        }
        BoundaryEvent::Locked if !raw.is_empty() => submit_code(run, key, raw),
        _ => run_to_boundary(run, key, 1),
    }
}

pub(crate) fn transcript(session: &EngineSession, key: &str) -> BoundaryResult {
    let mut boundary = describe_position(session, key);
    if let Some(state) = session.conversation(key) {
        boundary.messages = state
            .played_messages
            .iter()
            .enumerate()
            .filter(|(_, message)| !message.is_deleted())
            .map(|(index, message)| MessageView {
                conversation: key.to_string(),
                index,
                item: message.item.clone(),
            })
            .collect();
    }
    boundary
}

/// An unfinished conversation to continue with, preferring the active one.
pub(crate) fn next_unfinished(session: &EngineSession) -> Option<String> {
    if let Some(active) = session.active_conversation() {
        if !session.is_finished(active) {
            return Some(active.to_string());
        }
    }
    session
        .conversation_keys()
        .find(|key| !session.is_finished(key))
        .map(str::to_string)
}

pub(crate) fn narrate(boundary: &BoundaryResult) -> Vec<String> {
    let mut lines = Vec::new();
    for message in &boundary.messages {
        lines.push(message.item.preview());
    }
    for text in &boundary.thinking {
        lines.push(format!("(thinking) {}", text));
    }
    for (key, index) in &boundary.deleted {
        lines.push(format!("({} deleted message {})", key, index));
    }
    if let Some(file) = &boundary.unlocked_file {
        lines.push(format!("unlocked: {}", file));
    }
    match &boundary.credential {
        Some(CredentialOutcome::Denied) => lines.push("code rejected".to_string()),
        Some(CredentialOutcome::Unavailable { reason }) => {
            lines.push(format!("verifier unavailable: {}", reason));
        }
        _ => {}
    }
    match boundary.event {
        BoundaryEvent::Blocked => lines.push(format!(
            "finish {} first",
            boundary.active.as_deref().unwrap_or("the active chat")
        )),
        BoundaryEvent::Locked => lines.push(format!(
            "locked: {} (enter an access code)",
            boundary.locked_file.as_deref().unwrap_or("?")
        )),
        BoundaryEvent::End => lines.push(format!("[end of {}]", boundary.conversation)),
        _ => {}
    }
    lines
}

pub(crate) fn choice_lines(boundary: &BoundaryResult) -> Vec<String> {
    boundary
        .choices
        .iter()
        .map(|(id, text)| format!("  [{}] {}", id, text.replace('\n', " / ")))
        .collect()
}

pub(crate) fn handle_tui_command(
    raw: &str,
    state_file: &str,
    story: &LoadedStory,
    run: &mut StoryRun,
    viewing: &mut String,
    emit: &mut dyn FnMut(String),
) -> Result<TuiCommandAction, StoryError> {
    let (command, argument) = match raw.trim().split_once(' ') {
        Some((command, argument)) => (command, argument.trim()),
        None => (raw.trim(), ""),
    };
    match command {
        ":help" => {
            emit(LINE_COMMANDS.to_string());
            Ok(TuiCommandAction::Continue)
        }
        ":save" => {
            save_run_state(Path::new(state_file), run, &story.id)?;
            emit(format!("saved: {}", state_file));
            Ok(TuiCommandAction::Continue)
        }
        ":load" => {
            let (_, loaded) = load_run_from_state_for_story(Path::new(state_file), story)?;
            *run = loaded;
            *viewing = run.conversation_key(None)?;
            emit(format!("loaded: {}", state_file));
            Ok(TuiCommandAction::RefreshBoundary)
        }
        ":back" => {
            let boundary = go_back(run, viewing)?;
            *viewing = boundary.conversation;
            emit(match boundary.undone {
                Some(true) => "went back".to_string(),
                _ => "nothing to undo".to_string(),
            });
            Ok(TuiCommandAction::RefreshBoundary)
        }
        ":restart" => {
            let credentials: BTreeMap<String, String> = run.verifier.credentials();
            *run = create_run_for_story(story, credentials)?;
            *viewing = run.conversation_key(None)?;
            emit("restarted".to_string());
            Ok(TuiCommandAction::RefreshBoundary)
        }
        ":list" => {
            let session = run.session();
            for key in session.conversation_keys() {
                let mut flags = Vec::new();
                if session.active_conversation() == Some(key) {
                    flags.push("active");
                }
                if session.needs_attention(key) {
                    flags.push("new");
                }
                if session.is_finished(key) {
                    flags.push("done");
                }
                emit(format!("{} {}", key, flags.join(" ")).trim_end().to_string());
            }
            Ok(TuiCommandAction::Continue)
        }
        ":open" => {
            if run.session().conversation(argument).is_none() {
                emit(format!("unknown conversation: {}", argument));
                return Ok(TuiCommandAction::Continue);
            }
            *viewing = argument.to_string();
            run.player.session_mut().clear_attention(argument);
            emit(format!("viewing: {}", argument));
            Ok(TuiCommandAction::RefreshBoundary)
        }
        ":quit" => {
            emit("bye".to_string());
            Ok(TuiCommandAction::Quit)
        }
        _ => Ok(TuiCommandAction::NotHandled),
    }
}

pub(crate) fn handle_line_cmd(
    raw: &str,
    context: &TuiCommandContext<'_>,
    run: &mut StoryRun,
    viewing: &mut String,
    emit: &mut dyn FnMut(String),
) -> Result<TuiCommandAction, StoryError> {
    handle_tui_command(raw, context.state_file, context.story, run, viewing, emit)
}

/// `None` at end of input.
pub(crate) fn prompt_input_from(
    prefix: &str,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Result<Option<String>, StoryError> {
    write!(writer, "{}", prefix).map_err(map_tui_io)?;
    writer.flush().map_err(map_tui_io)?;
    let mut input = String::new();
    if reader.read_line(&mut input).map_err(map_tui_io)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim_end_matches(&['\r', '\n'][..]).to_string()))
}

fn write_lines(writer: &mut dyn Write, lines: &[String]) -> Result<(), StoryError> {
    for line in lines {
        writeln!(writer, "{}", line).map_err(map_tui_io)?;
    }
    Ok(())
}
