use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedKind {
    Insta,
    Slut,
}

impl FeedKind {
    pub fn command_name(self) -> &'static str {
        match self {
            Self::Insta => "insta",
            Self::Slut => "slut",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Instruction {
    #[serde(rename_all = "camelCase")]
    Talk { speaker_key: String, text: String },
    #[serde(rename_all = "camelCase")]
    Image { speaker_key: String, file_ref: String },
    #[serde(rename_all = "camelCase")]
    Video { speaker_key: String, file_ref: String },
    #[serde(rename_all = "camelCase")]
    Audio { speaker_key: String, file_ref: String },
    Status { text: String },
    #[serde(rename_all = "camelCase")]
    Delete { timer_millis: Option<u64> },
    Unlock { file: String },
    UnlockFeedPost { feed: FeedKind, file: String },
    Lock { file: String },
    #[serde(rename_all = "camelCase")]
    RealChoiceMarker { block_index: usize },
    PathStart { label: String },
    PathEnd,
    SpyUnlock,
    SpyAnchor { level: u32 },
    Thinking { blocks: Vec<String> },
}

impl Instruction {
    pub fn media(kind: MediaKind, speaker_key: String, file_ref: String) -> Self {
        match kind {
            MediaKind::Image => Self::Image {
                speaker_key,
                file_ref,
            },
            MediaKind::Video => Self::Video {
                speaker_key,
                file_ref,
            },
            MediaKind::Audio => Self::Audio {
                speaker_key,
                file_ref,
            },
        }
    }

    pub fn is_content(&self) -> bool {
        matches!(
            self,
            Self::Talk { .. }
                | Self::Image { .. }
                | Self::Video { .. }
                | Self::Audio { .. }
                | Self::Status { .. }
        )
    }

    pub fn speaker_key(&self) -> Option<&str> {
        match self {
            Self::Talk { speaker_key, .. }
            | Self::Image { speaker_key, .. }
            | Self::Video { speaker_key, .. }
            | Self::Audio { speaker_key, .. } => Some(speaker_key.as_str()),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Talk { .. } => "talk",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Audio { .. } => "audio",
            Self::Status { .. } => "status",
            Self::Delete { .. } => "delete",
            Self::Unlock { .. } => "unlock",
            Self::UnlockFeedPost { .. } => "unlockFeedPost",
            Self::Lock { .. } => "lock",
            Self::RealChoiceMarker { .. } => "realChoiceMarker",
            Self::PathStart { .. } => "pathStart",
            Self::PathEnd => "pathEnd",
            Self::SpyUnlock => "spyUnlock",
            Self::SpyAnchor { .. } => "spyAnchor",
            Self::Thinking { .. } => "thinking",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeChoiceBlock {
    pub options: Vec<String>,
    pub message_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealChoiceOption {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealChoiceBlock {
    pub options: Vec<RealChoiceOption>,
    /// Instruction index of the `RealChoiceMarker` that offers this block.
    pub marker_index: usize,
}

impl RealChoiceBlock {
    pub fn find_option(&self, label: &str) -> Option<&RealChoiceOption> {
        self.options.iter().find(|option| option.label == label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub fake_choices: Vec<FakeChoiceBlock>,
    pub real_choices: Vec<RealChoiceBlock>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn mark(&self) -> ProgramMark {
        ProgramMark {
            instructions: self.instructions.len(),
            fake_choices: self.fake_choices.len(),
            real_choices: self.real_choices.len(),
        }
    }

    pub fn truncate_to(&mut self, mark: &ProgramMark) {
        self.instructions.truncate(mark.instructions);
        self.fake_choices.truncate(mark.fake_choices);
        self.real_choices.truncate(mark.real_choices);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramMark {
    pub instructions: usize,
    pub fake_choices: usize,
    pub real_choices: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConversationKind {
    Contact,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub key: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHeader {
    pub key: String,
    pub kind: ConversationKind,
    pub title: String,
    pub participants: Vec<Participant>,
}
