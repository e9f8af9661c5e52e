use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::decode;

#[derive(Error, Debug)]
pub enum RepairError {
    #[error("ffmpeg timed out after {0}s")]
    Timeout(u64),
    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),
    #[error("repaired file failed verification: {0}")]
    VerifyFail(String),
    #[error("could not replace original: {0}")]
    Replace(std::io::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Repair a corrupt audio container with ffmpeg, verify the result decodes
/// to at least one second of audio, and atomically replace the original.
///
/// Strategy is container-dependent: FLAC goes straight to a re-encode
/// (stream-copying a broken FLAC reproduces the damage); anything else
/// tries a fast stream-copy remux first and falls back once to a full
/// re-encode. Both attempts share the same hard timeout; expiry is a
/// terminal failure with no retry.
pub fn heal_and_verify(path: &Path, timeout_secs: u64) -> Result<(), RepairError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let temp = temp_artifact(path, &ext);
    // Stale artifact from a killed worker
    std::fs::remove_file(&temp).ok();

    let first_attempt = if ext == "flac" {
        run_ffmpeg(path, &temp, &["-c:a", "flac"], timeout_secs)
    } else {
        run_ffmpeg(path, &temp, &["-c:a", "copy"], timeout_secs)
    };

    match first_attempt {
        Ok(()) => {}
        Err(e @ RepairError::Timeout(_)) => {
            std::fs::remove_file(&temp).ok();
            return Err(e);
        }
        Err(_) => {
            // One fallback: full re-encode with default codec selection.
            if let Err(e) = run_ffmpeg(path, &temp, &[], timeout_secs) {
                std::fs::remove_file(&temp).ok();
                return Err(e);
            }
        }
    }

    // Verification: the artifact must decode and carry >= 1s of audio.
    match decode::load_mono(&temp) {
        Ok(audio) if audio.is_long_enough() => {}
        Ok(_) => {
            std::fs::remove_file(&temp).ok();
            return Err(RepairError::VerifyFail("audio empty or too short".to_string()));
        }
        Err(e) => {
            std::fs::remove_file(&temp).ok();
            return Err(RepairError::VerifyFail(e.to_string()));
        }
    }

    // Same directory, so rename is atomic.
    std::fs::rename(&temp, path).map_err(RepairError::Replace)?;
    Ok(())
}

fn temp_artifact(path: &Path, ext: &str) -> PathBuf {
    if ext.is_empty() {
        PathBuf::from(format!("{}.repaired_tmp", path.display()))
    } else {
        PathBuf::from(format!("{}.repaired_tmp.{ext}", path.display()))
    }
}

/// Run one ffmpeg invocation with a hard deadline, killing the process on
/// expiry.
fn run_ffmpeg(
    input: &Path,
    output: &Path,
    codec_args: &[&str],
    timeout_secs: u64,
) -> Result<(), RepairError> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-y", "-v", "error", "-i"])
        .arg(input)
        .args(codec_args)
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| RepairError::Ffmpeg(e.to_string()))?;
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);

    loop {
        match child.try_wait()? {
            Some(status) if status.success() => return Ok(()),
            Some(status) => {
                return Err(RepairError::Ffmpeg(format!("exit status {status}")));
            }
            None => {
                if Instant::now() >= deadline {
                    child.kill().ok();
                    child.wait().ok();
                    return Err(RepairError::Timeout(timeout_secs));
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_artifact_keeps_extension() {
        assert_eq!(
            temp_artifact(Path::new("/m/a.flac"), "flac"),
            PathBuf::from("/m/a.flac.repaired_tmp.flac")
        );
        assert_eq!(
            temp_artifact(Path::new("/m/track"), ""),
            PathBuf::from("/m/track.repaired_tmp")
        );
    }

    #[test]
    fn unrepairable_garbage_fails_without_touching_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, vec![0u8; 128]).unwrap();

        let result = heal_and_verify(&path, 10);
        assert!(result.is_err());
        // Original still in place, no temp artifact left behind.
        assert!(path.exists());
        assert!(!temp_artifact(&path, "mp3").exists());
    }
}
