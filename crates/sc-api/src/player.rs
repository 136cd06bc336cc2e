use std::collections::BTreeMap;

use sc_core::{StepOutcome, StoryError};
use sc_runtime::{ContentLoader, CredentialOutcome, EngineSession, UnlockReceipt};
use tracing::{debug, info, warn};

/// Drives a session and answers its unlock requests from a loader, so
/// callers never see a pending unlock.
pub struct StoryPlayer {
    session: EngineSession,
    loader: Box<dyn ContentLoader>,
}

impl StoryPlayer {
    pub fn new(session: EngineSession, loader: Box<dyn ContentLoader>) -> Self {
        Self { session, loader }
    }

    /// Wraps a freshly restored session; an unlock that was pending when it
    /// was saved is resolved now.
    pub fn resume(
        session: EngineSession,
        loader: Box<dyn ContentLoader>,
    ) -> Result<(Self, Option<UnlockReceipt>), StoryError> {
        let mut player = Self::new(session, loader);
        let receipt = player.resolve_pending()?;
        Ok((player, receipt))
    }

    pub fn session(&self) -> &EngineSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut EngineSession {
        &mut self.session
    }

    pub fn into_session(self) -> EngineSession {
        self.session
    }

    pub fn advance(
        &mut self,
        key: &str,
    ) -> Result<(StepOutcome, Option<UnlockReceipt>), StoryError> {
        let outcome = self.session.advance(key)?;
        let receipt = match &outcome {
            StepOutcome::Unlock { .. } | StepOutcome::Lock { .. } => self.resolve_pending()?,
            _ => None,
        };
        Ok((outcome, receipt))
    }

    pub fn advance_active(
        &mut self,
    ) -> Result<(StepOutcome, Option<UnlockReceipt>), StoryError> {
        let key = self.active_key()?;
        self.advance(&key)
    }

    pub fn submit_credential(
        &mut self,
        key: &str,
        candidate: &str,
    ) -> Result<(CredentialOutcome, Option<UnlockReceipt>), StoryError> {
        let outcome = self.session.submit_credential(key, candidate)?;
        let receipt = match outcome {
            CredentialOutcome::Granted { .. } => self.resolve_pending()?,
            _ => None,
        };
        Ok((outcome, receipt))
    }

    pub fn resolve_pending(&mut self) -> Result<Option<UnlockReceipt>, StoryError> {
        let Some(pending) = self.session.pending_unlock().cloned() else {
            return Ok(None);
        };
        match self.loader.fetch_script_text(&pending.file) {
            Some(text) => {
                let receipt = self.session.ingest_file(&pending.file, &text)?;
                debug!(file = %receipt.file, key = ?receipt.key, "unlock resolved");
                Ok(Some(receipt))
            }
            None => {
                self.session.ingest_missing(&pending.file)?;
                Ok(None)
            }
        }
    }

    /// Swaps in a loader for another language and replays every
    /// conversation over the new text.
    pub fn reload_language(&mut self, loader: Box<dyn ContentLoader>) -> Result<(), StoryError> {
        let mut texts = BTreeMap::new();
        for file in self.session.parsed_files() {
            match loader.fetch_script_text(file) {
                Some(text) => {
                    texts.insert(file.clone(), text);
                }
                None => warn!(file = %file, "no translated text, keeping current language"),
            }
        }
        for file in self.session.parsed_files() {
            if texts.contains_key(file) {
                continue;
            }
            if let Some(text) = self.loader.fetch_script_text(file) {
                texts.insert(file.clone(), text);
            }
        }
        self.session.reload_sources(&texts)?;
        self.loader = loader;
        info!(files = texts.len(), "language reloaded");
        Ok(())
    }

    fn active_key(&self) -> Result<String, StoryError> {
        self.session
            .active_conversation()
            .map(str::to_string)
            .ok_or_else(|| {
                StoryError::new("API_NO_ACTIVE_CONVERSATION", "No conversation is active.")
            })
    }
}

#[cfg(test)]
mod player_tests {
    use super::*;
    use crate::tests::map;
    use crate::{create_session, CreateSessionOptions, MapContentLoader};
    use sc_compiler::NameTable;

    const MAIN: &str = "Amy\namy: hi\n$talks=ben.txt\namy: after\n";
    const BEN: &str = "Ben\nben: hey\n";

    fn player(scripts: BTreeMap<String, String>) -> StoryPlayer {
        let session = create_session(CreateSessionOptions {
            story_id: "demo".to_string(),
            scripts: scripts.clone(),
            entry_file: None,
            names: NameTable::new([("Amy", "amy"), ("Ben", "ben")]),
            lock_tiers: BTreeMap::new(),
            verifier: None,
        })
        .expect("session should build");
        StoryPlayer::new(session, Box::new(MapContentLoader::new(scripts)))
    }

    fn lines(player: &StoryPlayer, key: &str) -> Vec<String> {
        player
            .session()
            .conversation(key)
            .expect("conversation")
            .visible_messages()
            .map(|message| message.item.preview())
            .collect()
    }

    #[test]
    fn unlock_is_loaded_and_switches_conversation() {
        let mut player = player(map(&[("main.txt", MAIN), ("ben.txt", BEN)]));
        player.advance_active().expect("advance");
        let (outcome, receipt) = player.advance_active().expect("advance");
        assert_eq!(
            outcome,
            StepOutcome::Unlock {
                file: "ben.txt".to_string()
            }
        );
        let receipt = receipt.expect("receipt");
        assert_eq!(receipt.key.as_deref(), Some("ben"));
        assert!(receipt.switched);
        assert!(player.session().pending_unlock().is_none());

        player.advance_active().expect("advance");
        assert_eq!(lines(&player, "ben"), vec!["ben: hey"]);
    }

    #[test]
    fn missing_file_lets_the_story_continue() {
        let mut player = player(map(&[("main.txt", MAIN)]));
        player.advance_active().expect("advance");
        let (_, receipt) = player.advance_active().expect("advance");
        assert!(receipt.is_none());
        player.advance_active().expect("advance");
        assert_eq!(lines(&player, "amy"), vec!["amy: hi", "amy: after"]);
    }

    #[test]
    fn reload_language_rewrites_played_lines() {
        let mut player = player(map(&[("main.txt", MAIN), ("ben.txt", BEN)]));
        player.advance_active().expect("advance");
        player.advance_active().expect("advance");
        player.advance_active().expect("advance");

        let german = MapContentLoader::new(map(&[
            ("main.txt", "Amy\namy: hallo\n$talks=ben.txt\namy: danach\n"),
            ("ben.txt", "Ben\nben: moin\n"),
        ]));
        player
            .reload_language(Box::new(german))
            .expect("reload should pass");
        assert_eq!(lines(&player, "amy"), vec!["amy: hallo"]);
        assert_eq!(lines(&player, "ben"), vec!["ben: moin"]);
        assert_eq!(player.session().active_conversation(), Some("ben"));
    }

    #[test]
    fn resume_resolves_an_unlock_pending_at_save_time() {
        let scripts = map(&[("main.txt", MAIN), ("ben.txt", BEN)]);
        let mut session = create_session(CreateSessionOptions {
            story_id: "demo".to_string(),
            scripts: scripts.clone(),
            entry_file: None,
            names: NameTable::new([("Amy", "amy"), ("Ben", "ben")]),
            lock_tiers: BTreeMap::new(),
            verifier: None,
        })
        .expect("session should build");
        session.advance("amy").expect("advance");
        session.advance("amy").expect("advance");
        let save = session.save();
        assert!(save.pending_unlock.is_some());

        let resumed = crate::resume_session(crate::ResumeSessionOptions {
            scripts: scripts.clone(),
            save,
            names: NameTable::new([("Amy", "amy"), ("Ben", "ben")]),
            lock_tiers: BTreeMap::new(),
            verifier: None,
        })
        .expect("resume should succeed");
        let (player, receipt) =
            StoryPlayer::resume(resumed, Box::new(MapContentLoader::new(scripts)))
                .expect("resume player");
        assert_eq!(receipt.and_then(|receipt| receipt.key).as_deref(), Some("ben"));
        assert_eq!(player.session().active_conversation(), Some("ben"));
    }

    #[test]
    fn advance_active_needs_a_started_session() {
        let session = EngineSession::new(sc_runtime::SessionOptions::default());
        let mut player = StoryPlayer::new(session, Box::new(MapContentLoader::default()));
        let error = player.advance_active().expect_err("nothing active");
        assert_eq!(error.code, "API_NO_ACTIVE_CONVERSATION");
    }
}
