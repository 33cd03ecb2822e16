//! The mode handoff record.
//!
//! Dispatch writes which long-running role this container runs; later health
//! probes read it back to decide what to check. One JSON file, rewritten
//! atomically on every dispatch, no locking: last write wins, which is safe
//! because a container is only ever dispatched once.

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::role::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedMode {
    pub mode: Role,
    pub written_at: DateTime<Utc>,
}

impl RecordedMode {
    /// Age of the record relative to `now`. Clamps to zero if the clock
    /// moved backwards since the record was written.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.written_at).to_std().unwrap_or_default()
    }
}

/// Atomically overwrite the record at `path` with `role`, stamped now.
pub fn record(path: &Path, role: Role) -> io::Result<()> {
    let record = RecordedMode {
        mode: role,
        written_at: Utc::now(),
    };
    let json = serde_json::to_string(&record)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Read the record at `path`. Absent or unreadable contents are `None`: a
/// probe must never fail hard on a missing or garbled handoff, and must
/// never treat one as a known role.
pub fn read(path: &Path) -> io::Result<Option<RecordedMode>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    match serde_json::from_str(&contents) {
        Ok(record) => Ok(Some(record)),
        Err(err) => {
            warn!("unreadable mode record at {}: {err}", path.display());
            Ok(None)
        }
    }
}
