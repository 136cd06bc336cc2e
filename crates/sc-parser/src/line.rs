use std::sync::OnceLock;

use regex::Regex;
use sc_core::{FeedKind, MediaKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Media {
        kind: MediaKind,
        speaker: Option<String>,
        file: String,
    },
    Status {
        text: String,
    },
    Delete {
        timer_millis: Option<u64>,
    },
    Talks {
        file: String,
    },
    Feed {
        feed: FeedKind,
        file: String,
    },
    Lock {
        file: String,
    },
    SpyUnlock,
    SpyAnchor {
        level: u32,
    },
    Thinking,
    FakeChoices,
    Choices,
    /// `$end`, closes the current choice option.
    OptionEnd,
    Unknown {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptLine {
    Blank,
    Command(Command),
    PathStart { label: String },
    PathEnd,
    OptionLabel { label: String, text: String },
    BracketHeader { name: String },
    Message { speaker: String, text: String },
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub number: usize,
    pub raw: String,
    pub line: ScriptLine,
}

pub fn classify_source(source: &str) -> Vec<ClassifiedLine> {
    source
        .lines()
        .enumerate()
        .map(|(index, raw)| ClassifiedLine {
            number: index + 1,
            raw: raw.to_string(),
            line: classify_line(raw),
        })
        .collect()
}

pub fn classify_line(raw: &str) -> ScriptLine {
    let trimmed = raw.trim().trim_start_matches('\u{feff}');
    if trimmed.is_empty() {
        return ScriptLine::Blank;
    }

    if let Some(rest) = trimmed.strip_prefix('$') {
        return ScriptLine::Command(parse_command(rest, None));
    }

    if trimmed.eq_ignore_ascii_case("end path") {
        return ScriptLine::PathEnd;
    }
    if let Some(caps) = path_start_regex().captures(trimmed) {
        return ScriptLine::PathStart {
            label: caps[1].to_ascii_uppercase(),
        };
    }

    if let Some(caps) = option_label_regex().captures(trimmed) {
        return ScriptLine::OptionLabel {
            label: caps[1].to_string(),
            text: caps[2].trim().to_string(),
        };
    }

    if let Some(caps) = bracket_header_regex().captures(trimmed) {
        return ScriptLine::BracketHeader {
            name: caps[1].trim().to_string(),
        };
    }

    if let Some(caps) = message_regex().captures(trimmed) {
        let speaker = caps[1].trim().to_string();
        let text = caps[2].trim().to_string();
        if let Some(rest) = text.strip_prefix('$') {
            return ScriptLine::Command(parse_command(rest, Some(speaker)));
        }
        return ScriptLine::Message { speaker, text };
    }

    ScriptLine::Text {
        text: trimmed.to_string(),
    }
}

fn parse_command(body: &str, speaker: Option<String>) -> Command {
    let (name, value) = match body.split_once('=') {
        Some((name, value)) => (name.trim(), Some(value.trim())),
        None => (body.trim(), None),
    };
    let lowered = name.to_ascii_lowercase();

    let media = |kind| match value {
        Some(file) if !file.is_empty() => Command::Media {
            kind,
            speaker: speaker.clone(),
            file: file.to_string(),
        },
        _ => Command::Unknown {
            name: lowered.clone(),
        },
    };
    let with_file = |build: &dyn Fn(String) -> Command| match value {
        Some(file) if !file.is_empty() => build(file.to_string()),
        _ => Command::Unknown {
            name: lowered.clone(),
        },
    };

    match lowered.as_str() {
        "pics" => media(MediaKind::Image),
        "vids" => media(MediaKind::Video),
        "audio" => media(MediaKind::Audio),
        "status" => Command::Status {
            text: value.unwrap_or_default().to_string(),
        },
        "delete" => match value {
            None => Command::Delete { timer_millis: None },
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => Command::Delete { timer_millis: None },
                Ok(ms) => Command::Delete {
                    timer_millis: Some(ms),
                },
                Err(_) => Command::Unknown {
                    name: lowered.clone(),
                },
            },
        },
        "talks" => with_file(&|file| Command::Talks { file }),
        "insta" => with_file(&|file| Command::Feed {
            feed: FeedKind::Insta,
            file,
        }),
        "slut" => with_file(&|file| Command::Feed {
            feed: FeedKind::Slut,
            file,
        }),
        "lock" => with_file(&|file| Command::Lock { file }),
        "spy_unlock" => Command::SpyUnlock,
        "thinking" => Command::Thinking,
        "fake.choices" => Command::FakeChoices,
        "choices" => Command::Choices,
        "end" => Command::OptionEnd,
        other => match other
            .strip_prefix("spy_anchor_")
            .and_then(|level| level.parse::<u32>().ok())
        {
            Some(level) => Command::SpyAnchor { level },
            None => Command::Unknown {
                name: lowered.clone(),
            },
        },
    }
}

fn path_start_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)^path\s+([A-Za-z0-9_]+)$").expect("path regex"))
}

fn option_label_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^([A-Z])\.\s+(.*)$").expect("option label regex"))
}

fn bracket_header_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^\[([^\[\]]+)\]$").expect("bracket header regex"))
}

fn message_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_ .'\-]{0,31}?)\s*:\s*(.*)$").expect("message regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_messages_and_continuations() {
        assert_eq!(
            classify_line("Amy : hey there"),
            ScriptLine::Message {
                speaker: "Amy".to_string(),
                text: "hey there".to_string()
            }
        );
        assert_eq!(
            classify_line("mc:ok"),
            ScriptLine::Message {
                speaker: "mc".to_string(),
                text: "ok".to_string()
            }
        );
        assert_eq!(
            classify_line("   and then some   "),
            ScriptLine::Text {
                text: "and then some".to_string()
            }
        );
        assert_eq!(classify_line("   "), ScriptLine::Blank);
    }

    #[test]
    fn classifies_media_with_and_without_speaker() {
        assert_eq!(
            classify_line("$pics=beach.jpg"),
            ScriptLine::Command(Command::Media {
                kind: MediaKind::Image,
                speaker: None,
                file: "beach.jpg".to_string()
            })
        );
        assert_eq!(
            classify_line("amy: $audio=hi.mp3"),
            ScriptLine::Command(Command::Media {
                kind: MediaKind::Audio,
                speaker: Some("amy".to_string()),
                file: "hi.mp3".to_string()
            })
        );
        assert_eq!(
            classify_line("$vids="),
            ScriptLine::Command(Command::Unknown {
                name: "vids".to_string()
            })
        );
    }

    #[test]
    fn classifies_delete_variants() {
        assert_eq!(
            classify_line("$delete"),
            ScriptLine::Command(Command::Delete { timer_millis: None })
        );
        assert_eq!(
            classify_line("$delete=1500"),
            ScriptLine::Command(Command::Delete {
                timer_millis: Some(1500)
            })
        );
        assert_eq!(
            classify_line("$delete=0"),
            ScriptLine::Command(Command::Delete { timer_millis: None })
        );
        assert!(matches!(
            classify_line("$delete=soon"),
            ScriptLine::Command(Command::Unknown { .. })
        ));
    }

    #[test]
    fn classifies_unlock_family() {
        assert_eq!(
            classify_line("$talks=ben/intro.txt"),
            ScriptLine::Command(Command::Talks {
                file: "ben/intro.txt".to_string()
            })
        );
        assert_eq!(
            classify_line("$insta=post1.txt"),
            ScriptLine::Command(Command::Feed {
                feed: FeedKind::Insta,
                file: "post1.txt".to_string()
            })
        );
        assert_eq!(
            classify_line("$slut=post2.txt"),
            ScriptLine::Command(Command::Feed {
                feed: FeedKind::Slut,
                file: "post2.txt".to_string()
            })
        );
        assert_eq!(
            classify_line("$lock=vip.txt"),
            ScriptLine::Command(Command::Lock {
                file: "vip.txt".to_string()
            })
        );
        assert_eq!(
            classify_line("$spy_unlock"),
            ScriptLine::Command(Command::SpyUnlock)
        );
        assert_eq!(
            classify_line("$spy_anchor_3"),
            ScriptLine::Command(Command::SpyAnchor { level: 3 })
        );
    }

    #[test]
    fn classifies_blocks_and_markers() {
        assert_eq!(classify_line("$thinking"), ScriptLine::Command(Command::Thinking));
        assert_eq!(
            classify_line("$fake.choices"),
            ScriptLine::Command(Command::FakeChoices)
        );
        assert_eq!(classify_line("$choices"), ScriptLine::Command(Command::Choices));
        assert_eq!(classify_line("$end"), ScriptLine::Command(Command::OptionEnd));
        assert_eq!(
            classify_line("Path b"),
            ScriptLine::PathStart {
                label: "B".to_string()
            }
        );
        assert_eq!(classify_line("END PATH"), ScriptLine::PathEnd);
        assert_eq!(
            classify_line("A. Sure thing"),
            ScriptLine::OptionLabel {
                label: "A".to_string(),
                text: "Sure thing".to_string()
            }
        );
        assert_eq!(
            classify_line("[Amy, Ben]"),
            ScriptLine::BracketHeader {
                name: "Amy, Ben".to_string()
            }
        );
    }

    #[test]
    fn classify_source_numbers_lines_from_one() {
        let lines = classify_source("Amy\n\namy: hi\n");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[2].raw, "amy: hi");
        assert!(matches!(lines[1].line, ScriptLine::Blank));
    }
}
