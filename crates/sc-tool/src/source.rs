use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use walkdir::WalkDir;

use crate::{ScToolError, TestCase, TESTCASE_SCHEMA_V1};

const MANIFEST_FILE: &str = "story.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolManifest {
    pub entry_file: Option<String>,
    pub names: BTreeMap<String, String>,
    pub locks: BTreeMap<String, String>,
    pub access_codes: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct StorySource {
    pub scripts: BTreeMap<String, String>,
    pub manifest: ToolManifest,
}

pub fn read_story_dir(story_dir: &Path) -> Result<StorySource, ScToolError> {
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
        let Ok(relative) = path.strip_prefix(story_dir) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");

        let content = fs::read_to_string(path).map_err(|source| ScToolError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        scripts.insert(relative, content);
    }

    if scripts.is_empty() {
        return Err(ScToolError::SourceEmpty {
            path: story_dir.to_path_buf(),
        });
    }

    let manifest_path = story_dir.join(MANIFEST_FILE);
    let manifest = if manifest_path.is_file() {
        let raw = fs::read_to_string(&manifest_path).map_err(|source| ScToolError::ReadFile {
            path: manifest_path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ScToolError::ParseManifest {
            path: manifest_path,
            source,
        })?
    } else {
        ToolManifest::default()
    };

    Ok(StorySource { scripts, manifest })
}

pub fn read_test_case(case_path: &Path) -> Result<TestCase, ScToolError> {
    let raw = fs::read_to_string(case_path).map_err(|source| ScToolError::ReadFile {
        path: case_path.to_path_buf(),
        source,
    })?;
    let parsed: TestCase = serde_json::from_str(&raw).map_err(|source| ScToolError::ParseCase {
        path: case_path.to_path_buf(),
        source,
    })?;

    if parsed.schema_version != TESTCASE_SCHEMA_V1 {
        return Err(ScToolError::InvalidSchemaVersion {
            expected: TESTCASE_SCHEMA_V1.to_string(),
            found: parsed.schema_version,
        });
    }

    Ok(parsed)
}
