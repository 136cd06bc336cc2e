use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use sc_api::{
    create_session, resume_session, CreateSessionOptions, ResumeSessionOptions, StoryPlayer,
};
use sc_core::StoryError;
use sc_runtime::{EngineSession, EntitlementVerifier, UnlockReceipt};

use crate::{
    emit_boundary, load_player_state, load_story_by_ref, save_player_state, BoundaryResult,
    DirectoryLoader, LoadedStory, ManifestVerifier, PlayerState, PLAYER_STATE_SCHEMA,
};

pub(crate) struct StoryRun {
    pub(crate) player: StoryPlayer,
    pub(crate) verifier: Arc<ManifestVerifier>,
}

impl StoryRun {
    pub(crate) fn session(&self) -> &EngineSession {
        self.player.session()
    }

    /// `explicit`, else the active conversation.
    pub(crate) fn conversation_key(&self, explicit: Option<&str>) -> Result<String, StoryError> {
        if let Some(key) = explicit {
            return Ok(key.to_string());
        }
        self.session()
            .active_conversation()
            .map(str::to_string)
            .ok_or_else(|| StoryError::new("CLI_NO_CONVERSATION", "No conversation is active."))
    }
}

/// Session clock for interactive play: the saved clock plus wall time since start.
pub(crate) struct PlayClock {
    origin: Instant,
    base: u64,
}

impl PlayClock {
    pub(crate) fn start(base: u64) -> Self {
        Self {
            origin: Instant::now(),
            base,
        }
    }

    pub(crate) fn now(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.base.saturating_add(elapsed)
    }
}

fn shared_verifier(verifier: &Arc<ManifestVerifier>) -> Arc<dyn EntitlementVerifier> {
    verifier.clone()
}

pub(crate) fn create_run_for_story(
    story: &LoadedStory,
    credentials: BTreeMap<String, String>,
) -> Result<StoryRun, StoryError> {
    let verifier = Arc::new(ManifestVerifier::new(
        story.manifest.access_codes.clone(),
        credentials,
    ));
    let session = create_session(CreateSessionOptions {
        story_id: story.id.clone(),
        scripts: story.scripts.clone(),
        entry_file: story.manifest.entry_file.clone(),
        names: story.name_table(),
        lock_tiers: story.manifest.locks.clone(),
        verifier: Some(shared_verifier(&verifier)),
    })?;
    Ok(StoryRun {
        player: StoryPlayer::new(session, Box::new(DirectoryLoader::new(&story.root))),
        verifier,
    })
}

pub(crate) fn resume_run_for_state(
    story: &LoadedStory,
    state: &PlayerState,
) -> Result<(StoryRun, Option<UnlockReceipt>), StoryError> {
    let verifier = Arc::new(ManifestVerifier::new(
        story.manifest.access_codes.clone(),
        state.credentials.clone(),
    ));
    let session = resume_session(ResumeSessionOptions {
        scripts: story.scripts.clone(),
        save: state.save.clone(),
        names: story.name_table(),
        lock_tiers: story.manifest.locks.clone(),
        verifier: Some(shared_verifier(&verifier)),
    })?;
    let (player, receipt) =
        StoryPlayer::resume(session, Box::new(DirectoryLoader::new(&story.root)))?;
    Ok((StoryRun { player, verifier }, receipt))
}

pub(crate) fn save_run_state(
    path: &Path,
    run: &StoryRun,
    story_id: &str,
) -> Result<(), StoryError> {
    let state = PlayerState {
        schema_version: PLAYER_STATE_SCHEMA.to_string(),
        story_id: story_id.to_string(),
        save: run.session().save(),
        credentials: run.verifier.credentials(),
    };
    save_player_state(path, &state)
}

pub(crate) fn load_run_from_state_for_ref(
    path: &Path,
) -> Result<(LoadedStory, PlayerState, StoryRun), StoryError> {
    let state = load_player_state(path)?;
    let story = load_story_by_ref(&state.story_id)?;
    let (run, _) = resume_run_for_state(&story, &state)?;
    Ok((story, state, run))
}

pub(crate) fn load_run_from_state_for_story(
    path: &Path,
    story: &LoadedStory,
) -> Result<(PlayerState, StoryRun), StoryError> {
    let state = load_player_state(path)?;
    if state.story_id != story.id {
        return Err(StoryError::new(
            "TUI_STATE_STORY_MISMATCH",
            format!(
                "State story mismatch. expected={} actual={}",
                story.id, state.story_id
            ),
        ));
    }
    let (run, _) = resume_run_for_state(story, &state)?;
    Ok((state, run))
}

pub(crate) fn emit_boundary_with_saved_state(
    run: &StoryRun,
    boundary: BoundaryResult,
    state_out: &str,
    story_id: &str,
) -> Result<i32, StoryError> {
    save_run_state(Path::new(state_out), run, story_id)?;
    emit_boundary(boundary, Some(state_out.to_string()));
    Ok(0)
}
