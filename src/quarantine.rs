use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{ALGO_VERSION, TIME_FMT};

#[derive(Error, Debug)]
pub enum QuarantineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("quarantine source has no file name: {0}")]
    NoFileName(PathBuf),
}

/// Move an unrecoverable file into the quarantine area and write a sidecar
/// record explaining why. Files are never deleted and never overwritten:
/// name collisions get a `_1`, `_2`, … suffix until a free slot is found.
///
/// Returns the final resting path.
pub fn quarantine_file(
    file: &Path,
    quarantine_dir: &Path,
    reason: &str,
) -> Result<PathBuf, QuarantineError> {
    std::fs::create_dir_all(quarantine_dir)?;

    let file_name = file
        .file_name()
        .ok_or_else(|| QuarantineError::NoFileName(file.to_path_buf()))?;
    let target = free_slot(&quarantine_dir.join(file_name));

    log::warn!(
        "Quarantining {} -> {} ({})",
        file.display(),
        target.display(),
        reason
    );

    move_file(file, &target)?;
    write_sidecar(&target, reason, file)?;
    Ok(target)
}

/// Find a non-existing target name by appending `_1`, `_2`, … before the
/// extension.
fn free_slot(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }

    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| e.to_string_lossy().into_owned());
    let dir = target.parent().unwrap_or_else(|| Path::new("."));

    let mut counter = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Rename where possible; fall back to copy+remove when the quarantine area
/// lives on another filesystem.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

fn write_sidecar(target: &Path, reason: &str, origin: &Path) -> std::io::Result<()> {
    let sidecar = PathBuf::from(format!("{}.log", target.display()));
    let now = chrono::Local::now().format(TIME_FMT);
    std::fs::write(
        sidecar,
        format!(
            "Date: {now}\nReason: {reason}\nOrigin: {}\nVersion: {ALGO_VERSION}\n",
            origin.display()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"data").unwrap();
    }

    #[test]
    fn quarantine_moves_file_and_writes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let qdir = dir.path().join("quarantine");
        let src = dir.path().join("broken.flac");
        touch(&src);

        let target = quarantine_file(&src, &qdir, "Initial decode fault").unwrap();

        assert!(!src.exists());
        assert_eq!(target, qdir.join("broken.flac"));
        let sidecar =
            std::fs::read_to_string(format!("{}.log", target.display())).unwrap();
        assert!(sidecar.contains("Reason: Initial decode fault"));
        assert!(sidecar.contains("Origin:"));
        assert!(sidecar.contains(ALGO_VERSION));
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let qdir = dir.path().join("quarantine");

        for expected in ["broken.flac", "broken_1.flac", "broken_2.flac"] {
            let src = dir.path().join("broken.flac");
            touch(&src);
            let target = quarantine_file(&src, &qdir, "test").unwrap();
            assert_eq!(target, qdir.join(expected));
            assert!(target.exists());
        }

        // The earlier files were not overwritten.
        assert!(qdir.join("broken.flac").exists());
        assert!(qdir.join("broken_1.flac").exists());
    }

    #[test]
    fn extensionless_files_are_suffixed_too() {
        let dir = tempfile::tempdir().unwrap();
        let qdir = dir.path().join("quarantine");

        for expected in ["track", "track_1"] {
            let src = dir.path().join("track");
            touch(&src);
            let target = quarantine_file(&src, &qdir, "test").unwrap();
            assert_eq!(target, qdir.join(expected));
        }
    }
}
