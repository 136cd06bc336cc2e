use super::*;

use crate::host::VerifyOutcome;

impl EngineSession {
    pub fn locked_file(&self, key: &str) -> Option<String> {
        let state = self.conversations.get(key)?;
        if !state.waiting_for_lock {
            return None;
        }
        match self.registry.program(key)?.instruction(state.program_counter)? {
            Instruction::Lock { file } => Some(file.clone()),
            _ => None,
        }
    }

    /// Checks `candidate` against the tier of the lock `key` waits on. A
    /// verifier failure falls back to a cached credential for that tier.
    pub fn submit_credential(
        &mut self,
        key: &str,
        candidate: &str,
    ) -> Result<CredentialOutcome, StoryError> {
        self.require_conversation(key)?;
        let file = self.locked_file(key).ok_or_else(|| {
            StoryError::new(
                "SESSION_NOT_LOCKED",
                format!("Conversation \"{}\" is not waiting on a lock.", key),
            )
        })?;
        let tier = self.lock_tier(&file).to_string();

        match self.verifier.verify_remote(candidate, &tier) {
            Ok(VerifyOutcome::Granted { effective_tier }) => {
                info!(conversation = %key, tier = %effective_tier, "credential accepted");
                self.verifier.persist_credential(candidate, &effective_tier);
                let file = self.open_lock(key)?;
                Ok(CredentialOutcome::Granted { file })
            }
            Ok(VerifyOutcome::Denied) => {
                info!(conversation = %key, tier = %tier, "credential denied");
                Ok(CredentialOutcome::Denied)
            }
            Err(error) => {
                warn!(conversation = %key, tier = %tier, error = %error, "verifier unavailable");
                if self.verifier.has_local_credential_for(&tier) {
                    let file = self.open_lock(key)?;
                    return Ok(CredentialOutcome::Granted { file });
                }
                Ok(CredentialOutcome::Unavailable {
                    reason: error.message,
                })
            }
        }
    }

    fn open_lock(&mut self, key: &str) -> Result<String, StoryError> {
        let file = self.vm_call(key, |mut vm| vm.grant_lock())??;
        self.attention.remove(key);
        self.begin_unlock(key, &file);
        Ok(file)
    }
}
