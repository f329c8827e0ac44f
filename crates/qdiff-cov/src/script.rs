//! Collection script discovery.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};

/// One collection script found in the scripts directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionScript {
    /// File name, e.g. `collect_qiskit.sh`.
    pub name: String,

    /// Full path to the script.
    pub path: PathBuf,
}

/// Regular files directly inside `dir` named `<prefix>*.<extension>`, sorted
/// by file name.
pub fn discover_scripts(
    dir: &Path,
    prefix: &str,
    extension: &str,
) -> Result<Vec<CollectionScript>> {
    if !dir.is_dir() {
        return Err(CoverageError::ScriptsDirNotFound(dir.to_path_buf()));
    }

    let suffix = format!(".{extension}");
    let mut scripts = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(prefix) && name.ends_with(&suffix) {
            scripts.push(CollectionScript {
                name: name.to_string(),
                path: path.clone(),
            });
        }
    }
    scripts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(scripts)
}
