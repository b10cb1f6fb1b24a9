use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use shared::types::{to_published, DiscoveredTarget, DiscoverySnapshot};
use crate::error::WriteError;
use crate::fingerprint;

/// Result of handing a snapshot to the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publish {
    Unchanged,
    Written { targets: usize, fingerprint: String },
}

/// Publishes snapshots to a `file_sd` file, skipping unchanged ones.
/// Owns the last published snapshot; nothing else reads or writes it.
pub struct TargetWriter {
    path: PathBuf,
    last: Option<DiscoverySnapshot>,
}

impl TargetWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_published(&self) -> Option<&[DiscoveredTarget]> {
        self.last.as_deref()
    }

    /// Replace the file with `snapshot` unless it equals the last published
    /// one. On failure the previous snapshot is kept so the next cycle
    /// retries.
    pub fn publish(&mut self, snapshot: DiscoverySnapshot) -> Result<Publish, WriteError> {
        if !snapshot_changed(self.last.as_deref(), &snapshot) {
            tracing::info!("Targets not changed");
            return Ok(Publish::Unchanged);
        }

        let mut contents = serde_json::to_vec(&to_published(&snapshot))?;
        contents.push(b'\n');

        write_atomic(&self.path, &contents)?;

        let fingerprint = fingerprint::compute(&contents);
        let targets = snapshot.len();
        tracing::info!(
            "Wrote {} targets to {} ({})",
            targets,
            self.path.display(),
            fingerprint
        );

        self.last = Some(snapshot);
        Ok(Publish::Written { targets, fingerprint })
    }
}

/// Order-sensitive comparison: the same targets in a different order count
/// as a change.
pub fn snapshot_changed(old: Option<&[DiscoveredTarget]>, new: &[DiscoveredTarget]) -> bool {
    match old {
        None => true,
        Some(old) => {
            old.len() != new.len() || old.iter().zip(new).any(|(a, b)| target_changed(a, b))
        }
    }
}

fn target_changed(old: &DiscoveredTarget, new: &DiscoveredTarget) -> bool {
    old.address != new.address
        || old.service != new.service
        || old.stack != new.stack
        || old.host_id != new.host_id
        || old.labels != new.labels
}

/// Write to a temp file next to `path`, sync it, then rename it over `path`
/// so readers never observe a partial file.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    let io_error = |source: std::io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_error)?;
    tmp.write_all(contents).map_err(io_error)?;
    tmp.as_file().sync_all().map_err(io_error)?;

    // Temp files are created 0600; Prometheus usually runs as another user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(io_error)?;
    }

    tmp.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}
