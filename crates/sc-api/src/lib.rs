use std::collections::BTreeMap;
use std::sync::Arc;

use sc_compiler::{normalize_virtual_path, NameTable};
use sc_core::{SessionSave, StoryError};
use sc_runtime::{ContentLoader, EngineSession, EntitlementVerifier, SessionOptions};

mod player;

pub use player::StoryPlayer;

#[derive(Clone)]
pub struct CreateSessionOptions {
    pub story_id: String,
    pub scripts: BTreeMap<String, String>,
    pub entry_file: Option<String>,
    pub names: NameTable,
    pub lock_tiers: BTreeMap<String, String>,
    pub verifier: Option<Arc<dyn EntitlementVerifier>>,
}

#[derive(Clone)]
pub struct ResumeSessionOptions {
    pub scripts: BTreeMap<String, String>,
    pub save: SessionSave,
    pub names: NameTable,
    pub lock_tiers: BTreeMap<String, String>,
    pub verifier: Option<Arc<dyn EntitlementVerifier>>,
}

#[derive(Debug, Clone, Default)]
pub struct MapContentLoader {
    scripts: BTreeMap<String, String>,
}

impl MapContentLoader {
    pub fn new(scripts: BTreeMap<String, String>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(path, text)| (normalize_virtual_path(&path), text))
                .collect(),
        }
    }

    pub fn scripts(&self) -> &BTreeMap<String, String> {
        &self.scripts
    }
}

impl ContentLoader for MapContentLoader {
    fn fetch_script_text(&self, path: &str) -> Option<String> {
        self.scripts.get(&normalize_virtual_path(path)).cloned()
    }
}

pub fn create_session(options: CreateSessionOptions) -> Result<EngineSession, StoryError> {
    let loader = MapContentLoader::new(options.scripts);
    let entry_file = resolve_entry_file(loader.scripts(), options.entry_file)?;
    let mut session = EngineSession::new(SessionOptions {
        story_id: options.story_id,
        names: options.names,
        lock_tiers: options.lock_tiers,
        verifier: options.verifier,
    });
    let text = loader
        .fetch_script_text(&entry_file)
        .unwrap_or_default();
    session.start(&entry_file, &text)?;
    Ok(session)
}

pub fn resume_session(options: ResumeSessionOptions) -> Result<EngineSession, StoryError> {
    let loader = MapContentLoader::new(options.scripts);
    let mut session = EngineSession::new(SessionOptions {
        story_id: options.save.story_id.clone(),
        names: options.names,
        lock_tiers: options.lock_tiers,
        verifier: options.verifier,
    });
    session.restore(options.save, loader.scripts())?;
    Ok(session)
}

/// The explicit entry when given, otherwise `main.txt`.
pub fn resolve_entry_file(
    scripts: &BTreeMap<String, String>,
    explicit: Option<String>,
) -> Result<String, StoryError> {
    if let Some(entry) = explicit {
        let entry = normalize_virtual_path(&entry);
        if !scripts.contains_key(&entry) {
            return Err(StoryError::new(
                "API_ENTRY_FILE_NOT_FOUND",
                format!("Entry file \"{}\" is not in the story.", entry),
            ));
        }
        return Ok(entry);
    }

    if scripts.contains_key("main.txt") {
        return Ok("main.txt".to_string());
    }

    Err(StoryError::new(
        "API_ENTRY_MAIN_NOT_FOUND",
        "Expected \"main.txt\" as default entry file.",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_core::StepOutcome;

    pub(crate) fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn create(scripts: BTreeMap<String, String>, entry: Option<&str>) -> CreateSessionOptions {
        CreateSessionOptions {
            story_id: "demo".to_string(),
            scripts,
            entry_file: entry.map(str::to_string),
            names: NameTable::new([("Amy", "amy")]),
            lock_tiers: BTreeMap::new(),
            verifier: None,
        }
    }

    #[test]
    fn loader_normalizes_requested_paths() {
        let loader = MapContentLoader::new(map(&[("./chats/amy.txt", "Amy")]));
        assert_eq!(
            loader.fetch_script_text("chats/../chats/amy.txt").as_deref(),
            Some("Amy")
        );
        assert_eq!(loader.fetch_script_text("ben.txt"), None);
    }

    #[test]
    fn resolve_entry_file_prefers_explicit_then_main() {
        let scripts = map(&[("main.txt", "Amy"), ("alt.txt", "Amy")]);
        assert_eq!(
            resolve_entry_file(&scripts, Some("./alt.txt".to_string())).expect("explicit"),
            "alt.txt"
        );
        assert_eq!(resolve_entry_file(&scripts, None).expect("main"), "main.txt");

        let error = resolve_entry_file(&scripts, Some("gone.txt".to_string()))
            .expect_err("missing entry should fail");
        assert_eq!(error.code, "API_ENTRY_FILE_NOT_FOUND");
        let error = resolve_entry_file(&map(&[("a.txt", "Amy")]), None)
            .expect_err("default main should fail");
        assert_eq!(error.code, "API_ENTRY_MAIN_NOT_FOUND");
    }

    #[test]
    fn create_session_starts_entry_conversation() {
        let mut session =
            create_session(create(map(&[("main.txt", "Amy\namy: hello\n")]), None))
                .expect("session should build");
        assert_eq!(session.active_conversation(), Some("amy"));
        assert_eq!(
            session.advance("amy").expect("advance"),
            StepOutcome::Displayed { message_index: 0 }
        );
    }

    #[test]
    fn resume_session_replays_position_saved_as_json() {
        let scripts = map(&[("main.txt", "Amy\namy: one\namy: two\n")]);
        let mut session =
            create_session(create(scripts.clone(), None)).expect("session should build");
        session.advance("amy").expect("advance");
        session.advance("amy").expect("advance");
        let encoded = serde_json::to_string(&session.save()).expect("save should encode");
        let save = serde_json::from_str(&encoded).expect("save should decode");

        let resumed = resume_session(ResumeSessionOptions {
            scripts,
            save,
            names: NameTable::new([("Amy", "amy")]),
            lock_tiers: BTreeMap::new(),
            verifier: None,
        })
        .expect("resume should succeed");
        assert_eq!(resumed.conversation("amy"), session.conversation("amy"));
        assert_eq!(resumed.story_id(), "demo");
    }
}
