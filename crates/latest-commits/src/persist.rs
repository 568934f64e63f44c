use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};

use crate::metadata::MetadataRecord;
use crate::target::FetchTarget;

const STAGED_METADATA_FILE: &str = ".meta.json.partial";

/// Errors that can occur while writing a fetched artifact to disk.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Write the artifact and its `meta.json` into the target's directory.
/// Creates directories as needed. Returns the number of artifact bytes written.
///
/// Layout:
/// - `out/<build>/<platform>/latest_commits.txt`
/// - `out/<build>/<platform>/meta.json`
pub fn write_artifact(
    target: &FetchTarget,
    body: &[u8],
    fetched_at: DateTime<FixedOffset>,
) -> Result<u64, PersistError> {
    let dir = target.dest_dir();
    std::fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    // meta.json is renamed into place last. A new artifact never sits
    // beside a previous run's metadata.
    let meta = MetadataRecord::for_target(target, fetched_at).to_json()?;
    let staged = dir.join(STAGED_METADATA_FILE);
    std::fs::write(&staged, meta).map_err(|source| PersistError::Write {
        path: staged.clone(),
        source,
    })?;

    let artifact = target.artifact_path();
    if let Err(source) = std::fs::write(&artifact, body) {
        let _ = std::fs::remove_file(&staged);
        return Err(PersistError::Write {
            path: artifact,
            source,
        });
    }

    let meta_path = target.metadata_path();
    if let Err(source) = std::fs::rename(&staged, &meta_path) {
        let _ = std::fs::remove_file(&staged);
        let _ = std::fs::remove_file(&artifact);
        return Err(PersistError::Write {
            path: meta_path,
            source,
        });
    }

    Ok(body.len() as u64)
}
