use std::ffi::OsString;
use std::io::IsTerminal;

use clap::Parser;
use sc_core::StoryError;
use tracing_subscriber::EnvFilter;

mod agent;
mod boundary_runner;
mod cli_args;
mod error_map;
mod host;
mod line_tui;
mod models;
mod session_ops;
mod source_loader;
mod state_store;
mod tui;
mod tui_actions;
#[cfg(not(coverage))]
mod tui_render;
mod tui_state;

pub(crate) use boundary_runner::{
    boundary_lines, choose_fake, choose_real, describe_position, emit_boundary, go_back,
    run_to_boundary, submit_code, tick,
};
pub(crate) use cli_args::{
    AdvanceArgs, AgentArgs, AgentCommand, BackArgs, Cli, FakeChoiceArgs, Mode, PlayArgs,
    RealChoiceArgs, StartArgs, StateArgs, TickArgs, UnlockCodeArgs,
};
pub(crate) use error_map::{
    emit_error, json_string, map_cli_manifest_invalid, map_cli_source_path, map_cli_source_read,
    map_cli_source_scan, map_cli_state_encode, map_cli_state_invalid, map_cli_state_read,
    map_cli_state_write, map_tui_io,
};
pub(crate) use host::{DirectoryLoader, ManifestVerifier};
pub(crate) use line_tui::{
    choice_lines, narrate, next_unfinished, run_play_line_mode, transcript,
};
pub(crate) use models::{
    BoundaryEvent, BoundaryResult, LoadedStory, MessageView, PlayerState, StoryManifest,
    TuiCommandAction, TuiCommandContext, PLAYER_STATE_SCHEMA, STORY_MANIFEST_FILE,
};
pub(crate) use session_ops::{
    create_run_for_story, emit_boundary_with_saved_state, load_run_from_state_for_ref,
    load_run_from_state_for_story, resume_run_for_state, save_run_state, PlayClock, StoryRun,
};
pub(crate) use source_loader::{load_story_by_dir, load_story_by_ref};
pub(crate) use state_store::{load_player_state, save_player_state};

const DEFAULT_STATE_FILE: &str = ".storychat/save.json";
const LOG_ENV: &str = "STORYCHAT_LOG";

/// Installs the stderr subscriber; `STORYCHAT_LOG` takes an env-filter directive.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, StoryError> {
    match cli.command {
        Mode::Agent(args) => agent::run_agent(args),
        Mode::Play(args) => run_play(args),
    }
}

fn run_play(args: PlayArgs) -> Result<i32, StoryError> {
    let state_file = args
        .state_file
        .unwrap_or_else(|| DEFAULT_STATE_FILE.to_string());
    let story = load_story_by_dir(&args.story_dir)?;
    let mut run = create_run_for_story(&story, Default::default())?;
    tracing::info!(story = %story.id, state_file = %state_file, "starting player");

    let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
    if args.line || !interactive {
        return run_play_line_mode(&state_file, &story, &mut run);
    }
    tui::run_play_ratatui_mode(&state_file, &story, &mut run)
}

#[cfg(test)]
mod cli_test_support;
