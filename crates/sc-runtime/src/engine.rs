use sc_core::{
    ActionKind, ActionRecord, ConversationState, DisplayedItem, FeedKind, Instruction,
    MessageOrigin, PlayedMessage, Program, RealSelection, Registers, ScheduledDeletion, StepEffect,
    StepOutcome, StoryError, ThinkingReveal,
};
use tracing::{debug, trace, warn};

mod choice;
mod deletion;
mod replay;
mod step;
mod undo;

pub use replay::replay_to_state;

const STEP_GUARD: usize = 100_000;

pub trait StepEnv {
    fn is_unlocked(&self, file: &str) -> bool;
    /// Whether a cached credential already opens `$lock=file`.
    fn lock_satisfied(&self, file: &str) -> bool;
    fn has_feed_post(&self, feed: FeedKind, file: &str) -> bool;
    fn spy_unlocked(&self) -> bool;
    fn spy_anchor_level(&self) -> Option<u32>;
    fn clock_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Interactive,
    /// Auto mode used to rebuild a timeline: unlocks never stop, timed
    /// deletions apply at once and execution halts at `stop_at`.
    Replay { stop_at: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub outcome: StepOutcome,
    pub effects: Vec<StepEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoStep {
    Nothing,
    /// Only a pending choice or lock prompt was dismissed.
    ClearedWait,
    Popped(ActionRecord),
}

pub struct ConversationVm<'a> {
    state: &'a mut ConversationState,
    program: &'a Program,
}

impl<'a> ConversationVm<'a> {
    pub fn new(state: &'a mut ConversationState, program: &'a Program) -> Self {
        Self { state, program }
    }

    pub fn state(&self) -> &ConversationState {
        self.state
    }

    pub fn due_fake_block(&self) -> Option<usize> {
        due_fake_block(self.state, self.program)
    }

    pub fn is_finished(&self) -> bool {
        is_finished(self.state, self.program)
    }

    fn push_record(&mut self, prior: Registers, effects: Vec<StepEffect>, kind: ActionKind) {
        trace!(kind = kind.kind_name(), pc = prior.program_counter, "push action record");
        self.state.action_history.push(ActionRecord {
            prior,
            effects,
            kind,
        });
    }

    /// Effects from a step that pushed no record ride on the latest one.
    fn carry_effects(&mut self, effects: Vec<StepEffect>) {
        if effects.is_empty() {
            return;
        }
        match self.state.action_history.last_mut() {
            Some(record) => record.effects.extend(effects),
            None => warn!(
                count = effects.len(),
                "step effects with no action record to carry them"
            ),
        }
    }

    fn append_message(&mut self, item: DisplayedItem, origin: MessageOrigin) -> usize {
        self.state
            .played_messages
            .push(PlayedMessage::new(item, origin));
        self.state.played_messages.len() - 1
    }
}

pub fn due_fake_block(state: &ConversationState, program: &Program) -> Option<usize> {
    let cursor = state.next_fake_choice_cursor;
    program
        .fake_choices
        .get(cursor)
        .filter(|block| block.message_index <= state.program_counter)
        .map(|_| cursor)
}

pub fn is_finished(state: &ConversationState, program: &Program) -> bool {
    !state.is_waiting()
        && state.program_counter >= program.len()
        && due_fake_block(state, program).is_none()
}

fn displayed_item(instruction: &Instruction) -> Option<DisplayedItem> {
    let item = match instruction {
        Instruction::Talk { speaker_key, text } => DisplayedItem::Talk {
            speaker_key: speaker_key.clone(),
            text: text.clone(),
        },
        Instruction::Image {
            speaker_key,
            file_ref,
        } => DisplayedItem::Image {
            speaker_key: speaker_key.clone(),
            file_ref: file_ref.clone(),
        },
        Instruction::Video {
            speaker_key,
            file_ref,
        } => DisplayedItem::Video {
            speaker_key: speaker_key.clone(),
            file_ref: file_ref.clone(),
        },
        Instruction::Audio {
            speaker_key,
            file_ref,
        } => DisplayedItem::Audio {
            speaker_key: speaker_key.clone(),
            file_ref: file_ref.clone(),
        },
        Instruction::Status { text } => DisplayedItem::Status { text: text.clone() },
        _ => return None,
    };
    Some(item)
}

#[cfg(test)]
mod tests;
