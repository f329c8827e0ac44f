//! Numbered result folders under an output root.
//!
//! Folders are named `0001`, `0002`, ... The highest number ever handed out
//! is persisted in `.last_allocated`, so a number is never reused even after
//! its folder is deleted. Single writer per output root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CoverageError, Result};

/// High-water mark file inside the output root.
pub const HIGH_WATER_FILE: &str = ".last_allocated";

/// `7` → `0007`
pub fn folder_name(number: u64) -> String {
    format!("{number:04}")
}

fn parse_number(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Highest purely numeric subfolder name, 0 when there is none.
pub fn highest_numbered(output_root: &Path) -> Result<u64> {
    let mut highest = 0;
    for entry in fs::read_dir(output_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(n) = entry.file_name().to_str().and_then(parse_number) {
            highest = highest.max(n);
        }
    }
    Ok(highest)
}

fn read_high_water(output_root: &Path) -> Result<u64> {
    match fs::read_to_string(output_root.join(HIGH_WATER_FILE)) {
        Ok(raw) => Ok(parse_number(raw.trim()).unwrap_or(0)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Most recently allocated folder that still exists.
pub fn latest(output_root: &Path) -> Result<Option<PathBuf>> {
    if !output_root.is_dir() {
        return Ok(None);
    }
    let highest = highest_numbered(output_root)?;
    Ok((highest > 0).then(|| output_root.join(folder_name(highest))))
}

/// Create the next numbered folder under `output_root`.
pub fn allocate(output_root: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_root)?;

    let next = highest_numbered(output_root)?.max(read_high_water(output_root)?) + 1;
    let folder = output_root.join(folder_name(next));
    match fs::create_dir(&folder) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(CoverageError::ResultFolderExists(folder));
        }
        Err(e) => return Err(e.into()),
    }
    fs::write(output_root.join(HIGH_WATER_FILE), next.to_string())?;

    info!(folder = %folder.display(), "allocated result folder");
    Ok(folder)
}

/// Files directly inside `folder` with the given extension, sorted by name.
pub fn list_artifacts(folder: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Move every matching file from `working` into `dest`. Returns the new paths.
pub fn move_artifacts(working: &Path, dest: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut moved = Vec::new();
    for src in list_artifacts(working, extension)? {
        let Some(name) = src.file_name() else {
            continue;
        };
        let target = dest.join(name);
        move_file(&src, &target)?;
        debug!(from = %src.display(), to = %target.display(), "moved artifact");
        moved.push(target);
    }
    Ok(moved)
}

fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        // cross-device
        Err(_) => {
            fs::copy(src, dest)?;
            fs::remove_file(src)
        }
    }
}
