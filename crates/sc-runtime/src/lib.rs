mod engine;
mod host;
mod session;

pub use engine::{
    due_fake_block, is_finished, replay_to_state, ConversationVm, StepEnv, StepMode, StepReport,
    UndoStep,
};
pub use host::{
    ContentLoader, CredentialOutcome, EntitlementVerifier, NoCredentials, VerifyOutcome,
    DEFAULT_LOCK_TIER,
};
pub use session::{EngineSession, PendingUnlock, SessionOptions, UnlockReceipt};
