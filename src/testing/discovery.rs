use std::fs;
use std::path::{Path, PathBuf};

use crate::config::HarnessConfig;
use crate::errors::SerializationError;

/// A fixture directory found by [`discover`]. Nothing has been read from
/// it yet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixtureDescriptor {
    /// Path relative to the discovery root, `/` separated
    /// (e.g. `TitlePage/basic`).
    pub id: String,
    pub path: PathBuf,
}

impl FixtureDescriptor {
    pub fn new(root: &Path, path: PathBuf) -> Self {
        let id = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Self { id, path }
    }
}

/// Finds every fixture below `root`: a fixture is a directory holding the
/// meta file. Fixture directories are not searched further and symlinked
/// directories are skipped. A missing or empty root yields no fixtures.
/// The result is sorted by id.
pub fn discover(root: &Path, config: &HarnessConfig) -> Result<Vec<FixtureDescriptor>, SerializationError> {
    let mut found = Vec::new();
    if root.is_dir() {
        walk(root, root, config, &mut found)?;
    } else {
        log::debug!("Fixture root {} does not exist", root.display());
    }
    found.sort();
    Ok(found)
}

fn walk(root: &Path, dir: &Path, config: &HarnessConfig, found: &mut Vec<FixtureDescriptor>) -> Result<(), SerializationError> {
    if dir.join(&config.meta_file).is_file() {
        found.push(FixtureDescriptor::new(root, dir.to_path_buf()));
        return Ok(());
    }
    let entries = fs::read_dir(dir).map_err(|e| SerializationError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SerializationError::io(dir, e))?;
        let path = entry.path();
        // Symlinks are not followed.
        let file_type = entry.file_type().map_err(|e| SerializationError::io(&path, e))?;
        if file_type.is_dir() {
            walk(root, &path, config, found)?;
        }
    }
    Ok(())
}
