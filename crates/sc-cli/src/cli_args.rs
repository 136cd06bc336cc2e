use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "storychat")]
#[command(about = "Chat-story player and agent protocol")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Agent(AgentArgs),
    Play(PlayArgs),
}

#[derive(Debug, Args)]
pub(crate) struct AgentArgs {
    #[command(subcommand)]
    pub(crate) command: AgentCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum AgentCommand {
    Start(StartArgs),
    Advance(AdvanceArgs),
    Back(BackArgs),
    FakeChoice(FakeChoiceArgs),
    RealChoice(RealChoiceArgs),
    UnlockCode(UnlockCodeArgs),
    Tick(TickArgs),
}

#[derive(Debug, Args)]
pub(crate) struct StartArgs {
    #[arg(long = "story-dir")]
    pub(crate) story_dir: String,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
    #[arg(long = "steps", default_value_t = 1)]
    pub(crate) steps: usize,
}

/// Input and output state files shared by every transition.
#[derive(Debug, Clone, Args)]
pub(crate) struct StateArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
    /// Defaults to the active conversation.
    #[arg(long = "conversation")]
    pub(crate) conversation: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct AdvanceArgs {
    #[command(flatten)]
    pub(crate) state: StateArgs,
    #[arg(long = "steps", default_value_t = 1)]
    pub(crate) steps: usize,
}

#[derive(Debug, Args)]
pub(crate) struct BackArgs {
    #[command(flatten)]
    pub(crate) state: StateArgs,
}

#[derive(Debug, Args)]
pub(crate) struct FakeChoiceArgs {
    #[command(flatten)]
    pub(crate) state: StateArgs,
    #[arg(long = "index")]
    pub(crate) index: usize,
    /// Player line to send; the option text when omitted.
    #[arg(long = "text")]
    pub(crate) text: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct RealChoiceArgs {
    #[command(flatten)]
    pub(crate) state: StateArgs,
    #[arg(long = "block")]
    pub(crate) block: usize,
    #[arg(long = "label")]
    pub(crate) label: String,
    #[arg(long = "text")]
    pub(crate) text: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct UnlockCodeArgs {
    #[command(flatten)]
    pub(crate) state: StateArgs,
    #[arg(long = "code")]
    pub(crate) code: String,
}

#[derive(Debug, Args)]
pub(crate) struct TickArgs {
    #[command(flatten)]
    pub(crate) state: StateArgs,
    #[arg(long = "now")]
    pub(crate) now: u64,
}

#[derive(Debug, Args)]
pub(crate) struct PlayArgs {
    #[arg(long = "story-dir")]
    pub(crate) story_dir: String,
    #[arg(long = "state-file")]
    pub(crate) state_file: Option<String>,
    /// Forces the line player even on a terminal.
    #[arg(long = "line")]
    pub(crate) line: bool,
}
