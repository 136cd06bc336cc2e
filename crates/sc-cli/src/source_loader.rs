use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sc_core::StoryError;
use tracing::debug;
use walkdir::WalkDir;

use crate::{
    map_cli_manifest_invalid, map_cli_source_path, map_cli_source_read, map_cli_source_scan,
    LoadedStory, StoryManifest, STORY_MANIFEST_FILE,
};

const STORY_REF_PREFIX: &str = "story-dir:";

pub(crate) fn load_story_by_dir(story_dir: &str) -> Result<LoadedStory, StoryError> {
    let root = resolve_story_dir(story_dir)?;
    let scripts = read_scripts_from_dir(&root)?;
    let manifest = read_story_manifest(&root)?;
    let title = manifest.title.clone().unwrap_or_else(|| {
        format!(
            "Story {}",
            root.file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("unknown")
        )
    });
    debug!(root = %root.display(), scripts = scripts.len(), "story loaded");

    Ok(LoadedStory {
        id: make_story_id(&root),
        title,
        root,
        scripts,
        manifest,
    })
}

pub(crate) fn load_story_by_ref(story_ref: &str) -> Result<LoadedStory, StoryError> {
    match story_ref.strip_prefix(STORY_REF_PREFIX) {
        Some(raw) if !raw.is_empty() => load_story_by_dir(raw),
        _ => Err(StoryError::new(
            "CLI_SOURCE_REF_INVALID",
            format!("Unsupported story ref: {}", story_ref),
        )),
    }
}

pub(crate) fn resolve_story_dir(story_dir: &str) -> Result<PathBuf, StoryError> {
    let path = PathBuf::from(story_dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(StoryError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("story-dir does not exist: {}", absolute.display()),
        ));
    }

    if !absolute.is_dir() {
        return Err(StoryError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("story-dir is not a directory: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

/// Every `*.txt` under the story directory, keyed by its `/`-separated relative path.
pub(crate) fn read_scripts_from_dir(
    story_dir: &Path,
) -> Result<BTreeMap<String, String>, StoryError> {
    let mut scripts = BTreeMap::new();

    for entry in WalkDir::new(story_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
            continue;
        }

        let relative = path
            .strip_prefix(story_dir)
            .map_err(map_cli_source_scan)?
            .to_string_lossy()
            .replace('\\', "/");

        let content = fs::read_to_string(path).map_err(map_cli_source_read)?;
        scripts.insert(relative, content);
    }

    if scripts.is_empty() {
        return Err(StoryError::new(
            "CLI_SOURCE_EMPTY",
            format!("No .txt scripts under {}", story_dir.display()),
        ));
    }

    Ok(scripts)
}

/// A missing manifest means all defaults.
pub(crate) fn read_story_manifest(story_dir: &Path) -> Result<StoryManifest, StoryError> {
    let path = story_dir.join(STORY_MANIFEST_FILE);
    if !path.exists() {
        return Ok(StoryManifest::default());
    }
    let raw = fs::read_to_string(&path).map_err(map_cli_source_read)?;
    serde_json::from_str(&raw).map_err(map_cli_manifest_invalid)
}

pub(crate) fn make_story_id(story_dir: &Path) -> String {
    format!("{}{}", STORY_REF_PREFIX, story_dir.display())
}
