use sc_core::{StepOutcome, StoryError};
use sc_runtime::{CredentialOutcome, EngineSession};

use crate::{json_string, BoundaryEvent, BoundaryResult, MessageView, StoryRun};

/// Advances `key` up to `steps` times, stopping early at anything that
/// needs the player.
pub(crate) fn run_to_boundary(
    run: &mut StoryRun,
    key: &str,
    steps: usize,
) -> Result<BoundaryResult, StoryError> {
    let mut messages = Vec::new();
    let mut thinking = Vec::new();
    let mut deleted = Vec::new();
    let mut stop_event = None;
    let mut unlocked_file = None;

    for _ in 0..steps.max(1) {
        let (outcome, _receipt) = run.player.advance(key)?;
        match outcome {
            StepOutcome::Displayed { message_index } => {
                messages.extend(message_view(run.session(), key, message_index));
            }
            StepOutcome::Thinking { .. } => {
                let reveal = run
                    .session()
                    .conversation(key)
                    .and_then(|state| state.active_thinking_block.as_ref());
                if let Some(reveal) = reveal {
                    thinking.push(reveal.text.clone());
                }
            }
            StepOutcome::Deleted { target_message } => {
                deleted.extend(target_message.map(|target| (key.to_string(), target)));
            }
            StepOutcome::Unlock { file } | StepOutcome::Lock { file } => {
                stop_event = Some(BoundaryEvent::Unlocked);
                unlocked_file = Some(file);
                break;
            }
            StepOutcome::Blocked { .. } => {
                stop_event = Some(BoundaryEvent::Blocked);
                break;
            }
            StepOutcome::WaitingFakeChoice { .. }
            | StepOutcome::WaitingRealChoice { .. }
            | StepOutcome::WaitingLock { .. }
            | StepOutcome::Finished => break,
        }
        let settled = run
            .session()
            .conversation(key)
            .is_some_and(|state| state.is_waiting());
        if settled || run.session().is_finished(key) {
            break;
        }
    }

    let mut boundary = match stop_event {
        Some(event) => finish(run.session(), BoundaryResult::new(event, key)),
        None => describe_position(run.session(), key),
    };
    boundary.messages = messages;
    boundary.thinking = thinking;
    boundary.deleted = deleted;
    boundary.unlocked_file = unlocked_file;
    Ok(boundary)
}

pub(crate) fn describe_position(session: &EngineSession, key: &str) -> BoundaryResult {
    let mut boundary = BoundaryResult::new(BoundaryEvent::Message, key);
    if let Some(options) = session.pending_fake_options(key) {
        boundary.event = BoundaryEvent::FakeChoices;
        boundary.choice_block = session
            .conversation(key)
            .and_then(|state| state.active_fake_choice_index);
        boundary.choices = options
            .iter()
            .enumerate()
            .map(|(index, text)| (index.to_string(), text.clone()))
            .collect();
    } else if let Some((block_index, options)) = session.pending_real_options(key) {
        boundary.event = BoundaryEvent::RealChoices;
        boundary.choice_block = Some(block_index);
        boundary.choices = options
            .iter()
            .map(|option| (option.label.clone(), option.text.clone()))
            .collect();
    } else if let Some(file) = session.locked_file(key) {
        boundary.event = BoundaryEvent::Locked;
        boundary.locked_file = Some(file);
    } else if session.is_finished(key) {
        boundary.event = BoundaryEvent::End;
    }
    finish(session, boundary)
}

fn finish(session: &EngineSession, mut boundary: BoundaryResult) -> BoundaryResult {
    boundary.active = session.active_conversation().map(str::to_string);
    boundary.attention = session
        .conversation_keys()
        .filter(|key| session.needs_attention(key))
        .map(str::to_string)
        .collect();
    boundary
}

fn message_view(session: &EngineSession, key: &str, index: usize) -> Option<MessageView> {
    let message = session.conversation(key)?.played_messages.get(index)?;
    Some(MessageView {
        conversation: key.to_string(),
        index,
        item: message.item.clone(),
    })
}

pub(crate) fn choose_fake(
    run: &mut StoryRun,
    key: &str,
    index: usize,
    text: Option<&str>,
) -> Result<BoundaryResult, StoryError> {
    let text = match text {
        Some(text) => text.to_string(),
        None => run
            .session()
            .pending_fake_options(key)
            .and_then(|options| options.get(index))
            .cloned()
            .unwrap_or_default(),
    };
    let message_index = run
        .player
        .session_mut()
        .select_fake_choice(key, index, &text)?;
    let mut boundary = describe_position(run.session(), key);
    boundary.messages = message_view(run.session(), key, message_index)
        .into_iter()
        .collect();
    Ok(boundary)
}

pub(crate) fn choose_real(
    run: &mut StoryRun,
    key: &str,
    block_index: usize,
    label: &str,
    text: Option<&str>,
) -> Result<BoundaryResult, StoryError> {
    let text = match text {
        Some(text) => text.to_string(),
        None => run
            .session()
            .pending_real_options(key)
            .and_then(|(_, options)| options.iter().find(|option| option.label == label))
            .map(|option| option.text.clone())
            .unwrap_or_default(),
    };
    let message_index = run
        .player
        .session_mut()
        .select_real_choice(key, block_index, label, &text)?;
    let mut boundary = describe_position(run.session(), key);
    boundary.messages = message_view(run.session(), key, message_index)
        .into_iter()
        .collect();
    Ok(boundary)
}

pub(crate) fn submit_code(
    run: &mut StoryRun,
    key: &str,
    code: &str,
) -> Result<BoundaryResult, StoryError> {
    let (outcome, _receipt) = run.player.submit_credential(key, code)?;
    let mut boundary = match &outcome {
        CredentialOutcome::Granted { file } => {
            let mut boundary = finish(
                run.session(),
                BoundaryResult::new(BoundaryEvent::Unlocked, key),
            );
            boundary.unlocked_file = Some(file.clone());
            boundary
        }
        CredentialOutcome::Denied | CredentialOutcome::Unavailable { .. } => {
            describe_position(run.session(), key)
        }
    };
    boundary.credential = Some(outcome);
    Ok(boundary)
}

pub(crate) fn go_back(run: &mut StoryRun, key: &str) -> Result<BoundaryResult, StoryError> {
    let undone = run.player.session_mut().go_back(key)?;
    // The undo may have dropped `key` entirely; report the active one then.
    let shown = match run.session().conversation(key) {
        Some(_) => key.to_string(),
        None => run.conversation_key(None)?,
    };
    let mut boundary = describe_position(run.session(), &shown);
    boundary.undone = Some(undone);
    Ok(boundary)
}

pub(crate) fn tick(run: &mut StoryRun, key: &str, now: u64) -> BoundaryResult {
    let fired = run.player.session_mut().tick(now);
    let mut boundary = describe_position(run.session(), key);
    boundary.deleted = fired;
    boundary
}

pub(crate) fn emit_boundary(boundary: BoundaryResult, state_out: Option<String>) {
    for line in boundary_lines(&boundary, state_out) {
        println!("{}", line);
    }
}

pub(crate) fn boundary_lines(boundary: &BoundaryResult, state_out: Option<String>) -> Vec<String> {
    let mut lines = vec![
        "RESULT:OK".to_string(),
        format!("EVENT:{}", boundary.event.protocol_name()),
        format!("CONVERSATION:{}", boundary.conversation),
        format!("ACTIVE:{}", boundary.active.as_deref().unwrap_or("NONE")),
    ];

    for message in &boundary.messages {
        let json = serde_json::to_string(message).unwrap_or_else(|_| "null".to_string());
        lines.push(format!("MESSAGE_JSON:{}", json));
    }
    for text in &boundary.thinking {
        lines.push(format!("THINKING_JSON:{}", json_string(text)));
    }
    for (conversation, index) in &boundary.deleted {
        lines.push(format!("DELETED:{}|{}", conversation, index));
    }
    if let Some(block) = boundary.choice_block {
        lines.push(format!("CHOICE_BLOCK:{}", block));
    }
    for (id, text) in &boundary.choices {
        lines.push(format!("CHOICE:{}|{}", id, json_string(text)));
    }
    if let Some(file) = &boundary.locked_file {
        lines.push(format!("LOCKED_FILE:{}", file));
    }
    if let Some(file) = &boundary.unlocked_file {
        lines.push(format!("UNLOCKED_FILE:{}", file));
    }
    match &boundary.credential {
        Some(CredentialOutcome::Granted { .. }) => lines.push("CREDENTIAL:GRANTED".to_string()),
        Some(CredentialOutcome::Denied) => lines.push("CREDENTIAL:DENIED".to_string()),
        Some(CredentialOutcome::Unavailable { reason }) => {
            lines.push("CREDENTIAL:UNAVAILABLE".to_string());
            lines.push(format!("CREDENTIAL_REASON_JSON:{}", json_string(reason)));
        }
        None => {}
    }
    if let Some(undone) = boundary.undone {
        lines.push(format!("UNDONE:{}", undone));
    }
    for key in &boundary.attention {
        lines.push(format!("ATTENTION:{}", key));
    }
    lines.push(format!(
        "STATE_OUT:{}",
        state_out.unwrap_or_else(|| "NONE".to_string())
    ));
    lines
}
