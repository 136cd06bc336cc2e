use sc_core::StoryError;

/// Tier assumed for a `$lock` target the manifest does not describe.
pub const DEFAULT_LOCK_TIER: &str = "default";

pub trait ContentLoader {
    fn fetch_script_text(&self, path: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Granted { effective_tier: String },
    Denied,
}

/// Answers whether a credential satisfies an access tier. Implementations
/// own their storage, so persistence goes through `&self`.
pub trait EntitlementVerifier: Send + Sync {
    fn has_local_credential_for(&self, tier: &str) -> bool;
    fn verify_remote(&self, candidate: &str, tier: &str) -> Result<VerifyOutcome, StoryError>;
    fn persist_credential(&self, candidate: &str, tier: &str);
}

/// Verifier used when the host supplies none: nothing is ever granted.
#[derive(Debug, Default)]
pub struct NoCredentials;

impl EntitlementVerifier for NoCredentials {
    fn has_local_credential_for(&self, _tier: &str) -> bool {
        false
    }

    fn verify_remote(&self, _candidate: &str, _tier: &str) -> Result<VerifyOutcome, StoryError> {
        Ok(VerifyOutcome::Denied)
    }

    fn persist_credential(&self, _candidate: &str, _tier: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOutcome {
    /// The lock opened; `file` now waits for its content like any unlock.
    Granted { file: String },
    Denied,
    Unavailable { reason: String },
}
