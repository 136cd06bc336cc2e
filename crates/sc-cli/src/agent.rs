use std::collections::BTreeMap;
use std::path::Path;

use sc_core::StoryError;

use crate::{
    choose_fake, choose_real, create_run_for_story, emit_boundary_with_saved_state, go_back,
    load_player_state, load_story_by_dir, load_story_by_ref, resume_run_for_state,
    run_to_boundary, submit_code, tick, AdvanceArgs, AgentArgs, AgentCommand, BackArgs,
    BoundaryResult, FakeChoiceArgs, RealChoiceArgs, StartArgs, StateArgs, StoryRun, TickArgs,
    UnlockCodeArgs,
};

pub(super) fn run_agent(args: AgentArgs) -> Result<i32, StoryError> {
    match args.command {
        AgentCommand::Start(args) => run_start(args),
        AgentCommand::Advance(args) => run_advance(args),
        AgentCommand::Back(args) => run_back(args),
        AgentCommand::FakeChoice(args) => run_fake_choice(args),
        AgentCommand::RealChoice(args) => run_real_choice(args),
        AgentCommand::UnlockCode(args) => run_unlock_code(args),
        AgentCommand::Tick(args) => run_tick(args),
    }
}

pub(super) fn run_start(args: StartArgs) -> Result<i32, StoryError> {
    let story = load_story_by_dir(&args.story_dir)?;
    let mut run = create_run_for_story(&story, BTreeMap::new())?;
    let key = run.conversation_key(None)?;
    let boundary = run_to_boundary(&mut run, &key, args.steps)?;
    emit_boundary_with_saved_state(&run, boundary, &args.state_out, &story.id)
}

pub(super) fn run_advance(args: AdvanceArgs) -> Result<i32, StoryError> {
    let steps = args.steps;
    run_state_transition(&args.state, |run, key| run_to_boundary(run, key, steps))
}

pub(super) fn run_back(args: BackArgs) -> Result<i32, StoryError> {
    run_state_transition(&args.state, go_back)
}

pub(super) fn run_fake_choice(args: FakeChoiceArgs) -> Result<i32, StoryError> {
    run_state_transition(&args.state, |run, key| {
        choose_fake(run, key, args.index, args.text.as_deref())
    })
}

pub(super) fn run_real_choice(args: RealChoiceArgs) -> Result<i32, StoryError> {
    run_state_transition(&args.state, |run, key| {
        choose_real(run, key, args.block, &args.label, args.text.as_deref())
    })
}

pub(super) fn run_unlock_code(args: UnlockCodeArgs) -> Result<i32, StoryError> {
    run_state_transition(&args.state, |run, key| submit_code(run, key, &args.code))
}

pub(super) fn run_tick(args: TickArgs) -> Result<i32, StoryError> {
    let now = args.now;
    run_state_transition(&args.state, |run, key| Ok(tick(run, key, now)))
}

fn run_state_transition(
    args: &StateArgs,
    transition: impl FnOnce(&mut StoryRun, &str) -> Result<BoundaryResult, StoryError>,
) -> Result<i32, StoryError> {
    let state = load_player_state(Path::new(&args.state_in))?;
    let story = load_story_by_ref(&state.story_id)?;
    let (mut run, _) = resume_run_for_state(&story, &state)?;
    let key = run.conversation_key(args.conversation.as_deref())?;
    let boundary = transition(&mut run, &key)?;
    emit_boundary_with_saved_state(&run, boundary, &args.state_out, &state.story_id)
}
