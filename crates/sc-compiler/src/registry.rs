use std::collections::BTreeMap;

use sc_core::{ConversationHeader, Instruction, Program, ProgramMark};
use tracing::{debug, warn};

use crate::script_compile::ParsedScript;

/// Appends `addition` after `existing`, shifting every index it carries.
pub fn merge_programs(existing: Option<Program>, addition: Program) -> Program {
    let Some(mut merged) = existing else {
        return addition;
    };
    let instruction_offset = merged.instructions.len();
    let real_block_offset = merged.real_choices.len();

    merged
        .instructions
        .extend(addition.instructions.into_iter().map(|instruction| match instruction {
            Instruction::RealChoiceMarker { block_index } => Instruction::RealChoiceMarker {
                block_index: block_index + real_block_offset,
            },
            other => other,
        }));
    merged
        .fake_choices
        .extend(addition.fake_choices.into_iter().map(|mut block| {
            block.message_index += instruction_offset;
            block
        }));
    merged
        .real_choices
        .extend(addition.real_choices.into_iter().map(|mut block| {
            block.marker_index += instruction_offset;
            block
        }));
    merged
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredFile {
    pub key: String,
    /// Program lengths before the file was merged. `ProgramMark::default()`
    /// when the conversation did not exist yet.
    pub before: ProgramMark,
    pub created: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramRegistry {
    programs: BTreeMap<String, Program>,
    headers: BTreeMap<String, ConversationHeader>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a parsed file into its conversation. Files without a
    /// participant are skipped and yield `None`.
    pub fn register(&mut self, parsed: ParsedScript) -> Option<RegisteredFile> {
        let Some(header) = parsed.header else {
            warn!(file = %parsed.file_id, "ignoring script without participants");
            return None;
        };
        let key = header.key.clone();
        let existing = self.programs.remove(&key);
        let created = existing.is_none();
        let before = existing.as_ref().map(Program::mark).unwrap_or_default();
        let merged = merge_programs(existing, parsed.program);
        debug!(
            file = %parsed.file_id,
            key = %key,
            instructions = merged.len(),
            "merged script into conversation"
        );
        self.programs.insert(key.clone(), merged);
        self.headers.entry(key.clone()).or_insert(header);
        Some(RegisteredFile {
            key,
            before,
            created,
        })
    }

    pub fn program(&self, key: &str) -> Option<&Program> {
        self.programs.get(key)
    }

    pub fn header(&self, key: &str) -> Option<&ConversationHeader> {
        self.headers.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.programs.contains_key(key)
    }

    /// Rolls a program back to `mark`. Returns true when the conversation
    /// was dropped because nothing remained.
    pub fn truncate(&mut self, key: &str, mark: &ProgramMark) -> bool {
        let Some(program) = self.programs.get_mut(key) else {
            return false;
        };
        program.truncate_to(mark);
        if program.is_empty() && program.fake_choices.is_empty() {
            self.remove(key);
            return true;
        }
        false
    }

    pub fn remove(&mut self, key: &str) {
        self.programs.remove(key);
        self.headers.remove(key);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = &ConversationHeader> {
        self.headers.values()
    }

    pub fn clear(&mut self) {
        self.programs.clear();
        self.headers.clear();
    }
}
