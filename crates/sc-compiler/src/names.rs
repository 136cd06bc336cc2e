use std::collections::BTreeMap;

use sc_core::PLAYER_KEY;
use serde::{Deserialize, Serialize};

pub const PARTICIPANT_PALETTE: [&str; 6] = [
    "#e57373", "#64b5f6", "#81c784", "#ffb74d", "#ba68c8", "#4db6ac",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameTable {
    keys_by_name: BTreeMap<String, String>,
}

impl NameTable {
    pub fn new<I, N, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, K)>,
        N: AsRef<str>,
        K: Into<String>,
    {
        Self {
            keys_by_name: entries
                .into_iter()
                .map(|(name, key)| (name.as_ref().trim().to_lowercase(), key.into()))
                .collect(),
        }
    }

    /// Unknown names fall back to their lowercased literal form.
    pub fn resolve(&self, name: &str) -> String {
        let lowered = name.trim().to_lowercase();
        self.keys_by_name
            .get(&lowered)
            .cloned()
            .unwrap_or(lowered)
    }

    pub fn is_player(&self, name: &str) -> bool {
        self.resolve(name) == PLAYER_KEY
    }
}

pub(crate) fn palette_color(index: usize) -> &'static str {
    PARTICIPANT_PALETTE[index % PARTICIPANT_PALETTE.len()]
}
