use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sc_compiler::normalize_virtual_path;
use sc_core::StoryError;
use sc_runtime::{ContentLoader, EntitlementVerifier, VerifyOutcome};
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl ContentLoader for DirectoryLoader {
    fn fetch_script_text(&self, path: &str) -> Option<String> {
        let relative = normalize_virtual_path(path);
        if relative.is_empty() {
            return None;
        }
        match fs::read_to_string(self.root.join(&relative)) {
            Ok(text) => Some(text),
            Err(error) => {
                debug!(file = %relative, error = %error, "script not readable");
                None
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ManifestVerifier {
    access_codes: BTreeMap<String, String>,
    credentials: Mutex<BTreeMap<String, String>>,
}

impl ManifestVerifier {
    pub(crate) fn new(
        access_codes: BTreeMap<String, String>,
        credentials: BTreeMap<String, String>,
    ) -> Self {
        Self {
            access_codes,
            credentials: Mutex::new(credentials),
        }
    }

    /// Granted code to tier, for the state file.
    pub(crate) fn credentials(&self) -> BTreeMap<String, String> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EntitlementVerifier for ManifestVerifier {
    fn has_local_credential_for(&self, tier: &str) -> bool {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|granted| granted == tier)
    }

    fn verify_remote(&self, candidate: &str, tier: &str) -> Result<VerifyOutcome, StoryError> {
        if self.access_codes.is_empty() {
            return Err(StoryError::new(
                "CLI_VERIFIER_UNCONFIGURED",
                "The story manifest lists no access codes.",
            ));
        }
        match self.access_codes.get(candidate.trim()) {
            Some(granted) if granted == tier => Ok(VerifyOutcome::Granted {
                effective_tier: granted.clone(),
            }),
            _ => Ok(VerifyOutcome::Denied),
        }
    }

    fn persist_credential(&self, candidate: &str, tier: &str) {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(candidate.trim().to_string(), tier.to_string());
    }
}
