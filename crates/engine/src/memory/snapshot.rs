use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::atomic_io::write_text_atomic;
use super::checksum::sha256_hex;
use super::{Memory, MemoryStore};

pub const MEMORY_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read/write file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("snapshot at {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
    #[error("snapshot at {path} does not match its manifest checksum")]
    ChecksumMismatch { path: PathBuf },
    #[error("snapshot at {path} has format version {found}, expected {expected}")]
    VersionMismatch {
        path: PathBuf,
        found: u16,
        expected: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SnapshotManifest {
    pub format_version: u16,
    pub engine_version: String,
    pub tick: u64,
    pub payload_sha256_hex: String,
}

#[derive(Debug, Clone)]
enum ManifestReadState {
    Missing,
    Unreadable,
    Present(SnapshotManifest),
}

pub fn memory_path(dir: &Path) -> PathBuf {
    dir.join("memory.json")
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join("memory.manifest.json")
}

/// Memory persisted as JSON under a state directory, guarded by a manifest carrying
/// the payload's sha256. Both files are replaced atomically, payload first.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Tick recorded by the last successful save, if a readable manifest exists.
    pub fn saved_tick(&self) -> Option<u64> {
        match read_manifest(&manifest_path(&self.dir)) {
            Ok(ManifestReadState::Present(manifest)) => Some(manifest.tick),
            _ => None,
        }
    }
}

impl MemoryStore for SnapshotStore {
    fn load(&mut self) -> Result<Memory, SnapshotError> {
        let payload_path = memory_path(&self.dir);
        if !payload_path.exists() {
            info!(path = %payload_path.display(), "memory_snapshot_missing");
            return Ok(Memory::default());
        }

        let manifest = match read_manifest(&manifest_path(&self.dir))? {
            ManifestReadState::Present(manifest) => manifest,
            ManifestReadState::Missing | ManifestReadState::Unreadable => {
                return Err(SnapshotError::InvalidFormat {
                    path: manifest_path(&self.dir),
                    message: "manifest missing or unreadable".to_string(),
                })
            }
        };
        if manifest.format_version != MEMORY_FORMAT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                path: payload_path,
                found: manifest.format_version,
                expected: MEMORY_FORMAT_VERSION,
            });
        }

        let raw = fs::read_to_string(&payload_path).map_err(|source| SnapshotError::Io {
            path: payload_path.clone(),
            source,
        })?;
        if sha256_hex(raw.as_bytes()) != manifest.payload_sha256_hex {
            return Err(SnapshotError::ChecksumMismatch { path: payload_path });
        }

        let memory = decode_memory(&payload_path, &raw)?;
        info!(
            path = %payload_path.display(),
            tick = manifest.tick,
            rooms = memory.rooms.len(),
            units = memory.units.len(),
            "memory_snapshot_loaded"
        );
        Ok(memory)
    }

    fn save(&mut self, memory: &Memory, tick: u64) -> Result<(), SnapshotError> {
        let payload_path = memory_path(&self.dir);
        let raw = serde_json::to_string(memory).map_err(|error| SnapshotError::InvalidFormat {
            path: payload_path.clone(),
            message: format!("failed to encode memory json: {error}"),
        })?;
        write_text_atomic(&payload_path, &raw).map_err(|source| SnapshotError::Io {
            path: payload_path.clone(),
            source,
        })?;

        let manifest = SnapshotManifest {
            format_version: MEMORY_FORMAT_VERSION,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            tick,
            payload_sha256_hex: sha256_hex(raw.as_bytes()),
        };
        let manifest_path = manifest_path(&self.dir);
        let text =
            serde_json::to_string(&manifest).map_err(|error| SnapshotError::InvalidFormat {
                path: manifest_path.clone(),
                message: format!("failed to encode manifest json: {error}"),
            })?;
        write_text_atomic(&manifest_path, &text).map_err(|source| SnapshotError::Io {
            path: manifest_path,
            source,
        })
    }
}

pub(super) fn decode_memory(path: &Path, raw: &str) -> Result<Memory, SnapshotError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, Memory>(&mut deserializer).map_err(|error| {
        let at = error.path().to_string();
        let source = error.into_inner();
        let message = if at.is_empty() || at == "." {
            format!("parse memory json: {source}")
        } else {
            format!("parse memory json at {at}: {source}")
        };
        SnapshotError::InvalidFormat {
            path: path.to_path_buf(),
            message,
        }
    })
}

fn read_manifest(path: &Path) -> Result<ManifestReadState, SnapshotError> {
    if !path.exists() {
        return Ok(ManifestReadState::Missing);
    }

    let raw = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str::<SnapshotManifest>(&raw) {
        Ok(manifest) => Ok(ManifestReadState::Present(manifest)),
        Err(error) => {
            warn!(path = %path.display(), error = %error, "memory_manifest_unreadable");
            Ok(ManifestReadState::Unreadable)
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::UnitRole;
    use crate::memory::UnitMemory;
    use crate::world::{ObjectId, RoomName};

    fn memory_with_unit() -> Memory {
        let mut memory = Memory::default();
        memory.units.insert(
            ObjectId::from("u1"),
            UnitMemory::new(UnitRole::Pioneer, RoomName::from("W1N1")),
        );
        memory
    }

    #[test]
    fn missing_snapshot_loads_empty_memory() {
        let temp = TempDir::new().expect("tempdir");
        let mut store = SnapshotStore::new(temp.path().join("state"));
        assert_eq!(store.load().expect("load"), Memory::default());
        assert_eq!(store.saved_tick(), None);
    }

    #[test]
    fn save_then_load_restores_memory_and_tick() {
        let temp = TempDir::new().expect("tempdir");
        let mut store = SnapshotStore::new(temp.path());
        let memory = memory_with_unit();

        store.save(&memory, 42).expect("save");
        assert_eq!(store.saved_tick(), Some(42));
        assert_eq!(store.load().expect("load"), memory);
    }

    #[test]
    fn tampered_payload_fails_checksum() {
        let temp = TempDir::new().expect("tempdir");
        let mut store = SnapshotStore::new(temp.path());
        store.save(&memory_with_unit(), 1).expect("save");

        fs::write(memory_path(temp.path()), "{}").expect("tamper");
        let error = store.load().expect_err("checksum");
        assert!(matches!(error, SnapshotError::ChecksumMismatch { .. }));
    }

    #[test]
    fn payload_without_manifest_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(memory_path(temp.path()), "{}").expect("write payload");
        let mut store = SnapshotStore::new(temp.path());
        let error = store.load().expect_err("no manifest");
        assert!(matches!(error, SnapshotError::InvalidFormat { .. }));
    }

    #[test]
    fn decode_error_names_the_failing_path() {
        let raw = r#"{"units":{"u1":{"role":"wizard","room":"W1N1"}}}"#;
        let error = decode_memory(Path::new("memory.json"), raw).expect_err("bad role");
        let message = error.to_string();
        assert!(message.contains("units.u1.role"), "{message}");
    }
}
