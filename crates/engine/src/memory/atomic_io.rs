use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Replaces `path` with `text` so a crash leaves either the previous snapshot or the
/// new one on disk, never a torn file. The payload is flushed to disk before the
/// rename publishes it.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let staging = staging_path(dir, path);
    if let Err(error) = stage(&staging, text.as_bytes()) {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    if let Err(error) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    sync_dir(dir);
    Ok(())
}

fn stage(staging: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(staging)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Hidden sibling, so a leftover from a crashed save is never mistaken for a snapshot.
fn staging_path(dir: &Path, path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("memory.json");
    dir.join(format!(".{file_name}.partial"))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // The rename itself is durable only once the directory entry is flushed.
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_snapshot_and_leaves_no_staging_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("memory.json");

        write_text_atomic(&path, "first").expect("first write");
        write_text_atomic(&path, "second").expect("second write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
        let staging = staging_path(path.parent().expect("parent"), &path);
        assert!(!staging.exists());
        assert_eq!(
            fs::read_dir(path.parent().expect("parent"))
                .expect("list")
                .count(),
            1
        );
    }

    #[test]
    fn failed_publish_keeps_previous_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("memory.json");
        write_text_atomic(&path, "kept").expect("first write");

        // A directory squatting on the staging name makes the next save fail early.
        fs::create_dir(staging_path(temp.path(), &path)).expect("block staging");
        assert!(write_text_atomic(&path, "lost").is_err());

        assert_eq!(fs::read_to_string(&path).expect("read"), "kept");
    }
}
