use std::io::Write;
use std::path::Path;

use thiserror::Error;

use crate::TIME_FMT;

/// File name of the audit log inside the anchor repository.
pub const AUDIT_FILE_NAME: &str = "analysis_history.csv";

const HEADER: &str = "Timestamp,Filename,Action,BPM_Final,Method,Anchor_Ref,Score,Confidence,Estimate_A_Raw,Estimate_B_Raw";

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One classification decision, appended per successfully handled track.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub filename: String,
    pub action: String,
    pub bpm_final: i32,
    pub method: String,
    pub anchor_ref: String,
    pub score: f64,
    pub confidence: i32,
    pub estimate_a_raw: f64,
    pub estimate_b_raw: f64,
}

/// Append one row to the audit CSV, writing the header first when the file
/// is newly created.
pub fn append(audit_path: &Path, record: &AuditRecord) -> Result<(), AuditError> {
    if let Some(parent) = audit_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let existed = audit_path.exists();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_path)?;

    if !existed {
        writeln!(file, "{HEADER}")?;
    }

    let timestamp = chrono::Local::now().format(TIME_FMT).to_string();
    writeln!(
        file,
        "{},{},{},{},{},{},{:.3},{},{:.1},{:.1}",
        csv_field(&timestamp),
        csv_field(&record.filename),
        csv_field(&record.action),
        record.bpm_final,
        csv_field(&record.method),
        csv_field(&record.anchor_ref),
        record.score,
        record.confidence,
        record.estimate_a_raw,
        record.estimate_b_raw,
    )?;
    Ok(())
}

/// Quote a field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuditRecord {
        AuditRecord {
            filename: "song.flac".to_string(),
            action: "UPDATE".to_string(),
            bpm_final: 128,
            method: "Energy (direct)".to_string(),
            anchor_ref: "FAST (0.91) - anthem.flac".to_string(),
            score: 0.912,
            confidence: 91,
            estimate_a_raw: 128.3,
            estimate_b_raw: 64.1,
        }
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(AUDIT_FILE_NAME);

        append(&path, &sample()).unwrap();
        append(&path, &sample()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].contains("song.flac"));
        assert!(lines[2].contains("Energy (direct)"));
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchors").join(AUDIT_FILE_NAME);
        append(&path, &sample()).unwrap();
        assert!(path.exists());
    }
}
