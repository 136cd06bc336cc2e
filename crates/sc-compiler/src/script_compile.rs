use sc_core::{
    ConversationHeader, ConversationKind, FakeChoiceBlock, Instruction, Participant, Program,
    RealChoiceBlock, RealChoiceOption, StoryError, PLAYER_KEY,
};
use sc_parser::{classify_source, ClassifiedLine, Command, ScriptLine};
use tracing::warn;

use crate::names::{palette_color, NameTable};
use crate::source_path::normalize_virtual_path;

/// Result of parsing one script file. `header == None` marks a file with no
/// recognized participant; its instructions are not registered anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScript {
    pub file_id: String,
    pub header: Option<ConversationHeader>,
    pub program: Program,
    pub diagnostics: Vec<StoryError>,
}

impl ParsedScript {
    pub fn is_empty(&self) -> bool {
        self.header.is_none()
    }

    pub fn conversation_key(&self) -> Option<&str> {
        self.header.as_ref().map(|header| header.key.as_str())
    }
}

pub fn parse_script(raw_text: &str, file_id: &str, names: &NameTable) -> ParsedScript {
    let mut compiler = ScriptCompiler::new(file_id, names);
    for line in classify_source(raw_text) {
        compiler.feed(line);
    }
    compiler.finish()
}

#[derive(Debug)]
enum OpenBlock {
    Thinking {
        blocks: Vec<String>,
    },
    Fake {
        options: Vec<String>,
        current: Option<String>,
        message_index: usize,
        line: usize,
    },
    Real {
        options: Vec<RealChoiceOption>,
        current: Option<RealChoiceOption>,
        line: usize,
    },
}

struct HeaderDecl {
    title: String,
    members: Vec<(String, String)>,
}

struct ScriptCompiler<'a> {
    file_id: String,
    names: &'a NameTable,
    program: Program,
    header: Option<HeaderDecl>,
    first_speaker: Option<(String, String)>,
    last_speaker: Option<String>,
    block: Option<OpenBlock>,
    path_depth: usize,
    last_line: usize,
    diagnostics: Vec<StoryError>,
}

impl<'a> ScriptCompiler<'a> {
    fn new(file_id: &str, names: &'a NameTable) -> Self {
        Self {
            file_id: file_id.to_string(),
            names,
            program: Program::default(),
            header: None,
            first_speaker: None,
            last_speaker: None,
            block: None,
            path_depth: 0,
            last_line: 0,
            diagnostics: Vec::new(),
        }
    }

    fn feed(&mut self, line: ClassifiedLine) {
        self.last_line = line.number;
        if self.block.is_some() {
            if self.feed_block(&line) {
                return;
            }
            self.close_block();
        }

        match line.line {
            ScriptLine::Blank => {}
            ScriptLine::BracketHeader { name } => {
                if self.can_declare_header() {
                    self.declare_header(&name);
                } else {
                    self.diagnose(
                        "PARSE_HEADER_IGNORED",
                        format!("Header \"{}\" after content is ignored.", name),
                        line.number,
                    );
                }
            }
            ScriptLine::Text { text } => self.handle_text(text, line.number),
            ScriptLine::OptionLabel { .. } => {
                let text = line.raw.trim().to_string();
                self.handle_text(text, line.number);
            }
            ScriptLine::Message { speaker, text } => {
                let speaker_key = self.note_speaker(&speaker);
                self.program.instructions.push(Instruction::Talk {
                    speaker_key,
                    text,
                });
            }
            ScriptLine::PathStart { label } => {
                self.path_depth += 1;
                self.program
                    .instructions
                    .push(Instruction::PathStart { label });
            }
            ScriptLine::PathEnd => {
                if self.path_depth == 0 {
                    self.diagnose(
                        "PARSE_PATH_UNBALANCED",
                        "\"end path\" without an open path.",
                        line.number,
                    );
                } else {
                    self.path_depth -= 1;
                }
                self.program.instructions.push(Instruction::PathEnd);
            }
            ScriptLine::Command(command) => self.handle_command(command, line.number),
        }
    }

    fn handle_command(&mut self, command: Command, number: usize) {
        let instruction = match command {
            Command::Media {
                kind,
                speaker,
                file,
            } => {
                let speaker_key = match speaker {
                    Some(speaker) => self.note_speaker(&speaker),
                    None => self.default_media_speaker(),
                };
                Instruction::media(kind, speaker_key, file)
            }
            Command::Status { text } => Instruction::Status { text },
            Command::Delete { timer_millis } => Instruction::Delete { timer_millis },
            Command::Talks { file } => Instruction::Unlock {
                file: normalize_virtual_path(&file),
            },
            Command::Feed { feed, file } => Instruction::UnlockFeedPost {
                feed,
                file: normalize_virtual_path(&file),
            },
            Command::Lock { file } => Instruction::Lock {
                file: normalize_virtual_path(&file),
            },
            Command::SpyUnlock => Instruction::SpyUnlock,
            Command::SpyAnchor { level } => Instruction::SpyAnchor { level },
            Command::Thinking => {
                self.block = Some(OpenBlock::Thinking { blocks: Vec::new() });
                return;
            }
            Command::FakeChoices => {
                self.block = Some(OpenBlock::Fake {
                    options: Vec::new(),
                    current: None,
                    message_index: self.program.instructions.len(),
                    line: number,
                });
                return;
            }
            Command::Choices => {
                self.block = Some(OpenBlock::Real {
                    options: Vec::new(),
                    current: None,
                    line: number,
                });
                return;
            }
            Command::OptionEnd => {
                self.diagnose(
                    "PARSE_OPTION_END_STRAY",
                    "\"$end\" outside a choice block.",
                    number,
                );
                return;
            }
            Command::Unknown { name } => {
                self.diagnose(
                    "PARSE_COMMAND_UNKNOWN",
                    format!("Unrecognized or malformed command \"${}\".", name),
                    number,
                );
                return;
            }
        };
        self.program.instructions.push(instruction);
    }

    /// Returns false when the line ends the open block and must be handled normally.
    fn feed_block(&mut self, line: &ClassifiedLine) -> bool {
        let Some(block) = self.block.as_mut() else {
            return false;
        };
        let mut orphan = false;
        let consumed = match block {
            OpenBlock::Thinking { blocks } => match &line.line {
                ScriptLine::Blank => true,
                ScriptLine::Text { .. } | ScriptLine::OptionLabel { .. } => {
                    blocks.push(line.raw.trim().to_string());
                    true
                }
                _ => false,
            },
            OpenBlock::Fake {
                options, current, ..
            } => match &line.line {
                ScriptLine::Blank | ScriptLine::Command(Command::OptionEnd) => {
                    if let Some(done) = current.take() {
                        options.push(done);
                    }
                    true
                }
                ScriptLine::Text { .. } | ScriptLine::OptionLabel { .. } => {
                    let text = line.raw.trim();
                    if let Some(open) = current.as_mut() {
                        open.push('\n');
                        open.push_str(text);
                    } else {
                        *current = Some(text.to_string());
                    }
                    true
                }
                _ => false,
            },
            OpenBlock::Real {
                options, current, ..
            } => match &line.line {
                ScriptLine::Blank | ScriptLine::Command(Command::OptionEnd) => {
                    if let Some(done) = current.take() {
                        options.push(done);
                    }
                    true
                }
                ScriptLine::OptionLabel { label, text } => {
                    if let Some(done) = current.take() {
                        options.push(done);
                    }
                    *current = Some(RealChoiceOption {
                        label: label.clone(),
                        text: text.clone(),
                    });
                    true
                }
                ScriptLine::Text { text } => {
                    match current.as_mut() {
                        Some(open) => {
                            open.text.push('\n');
                            open.text.push_str(text);
                        }
                        None => orphan = true,
                    }
                    true
                }
                _ => false,
            },
        };
        if orphan {
            self.diagnose(
                "PARSE_CHOICE_UNLABELED",
                "Choice text before the first labeled option is dropped.",
                line.number,
            );
        }
        consumed
    }

    fn close_block(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        match block {
            OpenBlock::Thinking { blocks } => {
                if blocks.is_empty() {
                    return;
                }
                self.program
                    .instructions
                    .push(Instruction::Thinking { blocks });
            }
            OpenBlock::Fake {
                mut options,
                current,
                message_index,
                line,
            } => {
                options.extend(current);
                if options.is_empty() {
                    self.diagnose(
                        "PARSE_CHOICE_EMPTY",
                        "\"$fake.choices\" block has no options.",
                        line,
                    );
                }
                self.program.fake_choices.push(FakeChoiceBlock {
                    options,
                    message_index,
                });
            }
            OpenBlock::Real {
                mut options,
                current,
                line,
            } => {
                options.extend(current);
                if options.is_empty() {
                    self.diagnose(
                        "PARSE_CHOICE_EMPTY",
                        "\"$choices\" block has no options.",
                        line,
                    );
                }
                let block_index = self.program.real_choices.len();
                self.program.real_choices.push(RealChoiceBlock {
                    options,
                    marker_index: self.program.instructions.len(),
                });
                self.program
                    .instructions
                    .push(Instruction::RealChoiceMarker { block_index });
            }
        }
    }

    fn handle_text(&mut self, text: String, number: usize) {
        if self.can_declare_header() {
            self.declare_header(&text);
            return;
        }
        if let Some(Instruction::Talk { text: previous, .. }) = self.program.instructions.last_mut()
        {
            previous.push('\n');
            previous.push_str(&text);
            return;
        }
        self.diagnose(
            "PARSE_TEXT_ORPHAN",
            format!("Line \"{}\" does not continue a message.", text),
            number,
        );
    }

    fn can_declare_header(&self) -> bool {
        self.header.is_none()
            && self.program.instructions.is_empty()
            && self.program.fake_choices.is_empty()
    }

    fn declare_header(&mut self, raw: &str) {
        let title = raw.trim().to_string();
        let members = title
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| (name.to_string(), self.names.resolve(name)))
            .filter(|(_, key)| key != PLAYER_KEY)
            .collect::<Vec<_>>();
        self.header = Some(HeaderDecl { title, members });
    }

    fn note_speaker(&mut self, speaker: &str) -> String {
        let key = self.names.resolve(speaker);
        if key != PLAYER_KEY {
            if self.first_speaker.is_none() {
                self.first_speaker = Some((speaker.trim().to_string(), key.clone()));
            }
            self.last_speaker = Some(key.clone());
        }
        key
    }

    fn default_media_speaker(&self) -> String {
        if let Some(key) = &self.last_speaker {
            return key.clone();
        }
        self.header
            .as_ref()
            .and_then(|header| header.members.first())
            .map(|(_, key)| key.clone())
            .unwrap_or_else(|| PLAYER_KEY.to_string())
    }

    fn diagnose(&mut self, code: &str, message: impl Into<String>, line: usize) {
        let error = StoryError::at_line(code, message, line);
        warn!(file = %self.file_id, line, code, "{}", error.message);
        self.diagnostics.push(error);
    }

    fn finish(mut self) -> ParsedScript {
        self.close_block();
        if self.path_depth > 0 {
            let (depth, last_line) = (self.path_depth, self.last_line);
            self.diagnose(
                "PARSE_PATH_UNCLOSED",
                format!("{} path block(s) left open at end of file.", depth),
                last_line,
            );
        }

        let header = self.build_header();
        if header.is_none() {
            warn!(file = %self.file_id, "script has no recognized participant");
        }
        ParsedScript {
            file_id: self.file_id,
            header,
            program: self.program,
            diagnostics: self.diagnostics,
        }
    }

    fn build_header(&self) -> Option<ConversationHeader> {
        let participants = |members: &[(String, String)]| {
            members
                .iter()
                .enumerate()
                .map(|(index, (name, key))| Participant {
                    name: name.clone(),
                    key: key.clone(),
                    color: palette_color(index).to_string(),
                })
                .collect::<Vec<_>>()
        };

        match &self.header {
            Some(decl) if decl.members.len() > 1 => Some(ConversationHeader {
                key: decl
                    .members
                    .iter()
                    .map(|(_, key)| key.as_str())
                    .collect::<Vec<_>>()
                    .join("_"),
                kind: ConversationKind::Group,
                title: decl.title.clone(),
                participants: participants(&decl.members),
            }),
            // `[Amy, Me]` leaves one participant: that is Amy's own chat.
            Some(decl) if !decl.members.is_empty() => Some(ConversationHeader {
                key: decl.members[0].1.clone(),
                kind: ConversationKind::Contact,
                title: decl.members[0].0.clone(),
                participants: participants(&decl.members),
            }),
            Some(decl) if decl.title.contains(',') => None,
            _ => self
                .first_speaker
                .as_ref()
                .map(|(name, key)| ConversationHeader {
                    key: key.clone(),
                    kind: ConversationKind::Contact,
                    title: name.clone(),
                    participants: participants(&[(name.clone(), key.clone())]),
                }),
        }
    }
}
