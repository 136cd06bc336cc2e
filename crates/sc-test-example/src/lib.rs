//! Paths to the bundled sample stories shared by integration tests.

use std::path::PathBuf;

pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

pub fn stories_root() -> PathBuf {
    workspace_root().join("stories")
}

pub fn story_dir(name: &str) -> PathBuf {
    stories_root().join(name)
}

pub fn testcase_path(name: &str) -> PathBuf {
    story_dir(name).join("testcase.json")
}
