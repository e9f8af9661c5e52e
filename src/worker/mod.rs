pub mod decode;
pub mod features;
pub mod moods;
pub mod reconcile;
pub mod repair;

use std::path::Path;

use thiserror::Error;

use crate::config::AppConfig;
use crate::{anchors, audit, quarantine, tags};
use decode::DecodedAudio;
use features::FeatureBackend;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("quarantine failed: {0}")]
    Quarantine(#[from] quarantine::QuarantineError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the worker handled its file. All variants map to exit code 0; only a
/// `WorkerError` surfaces as exit code 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Result written (or write failed benignly, leaving the track for a
    /// later cycle).
    Completed,
    /// File moved aside with a recorded reason.
    Quarantined(String),
    /// File vanished between queueing and processing.
    SkippedMissing,
}

/// Run the full per-track pipeline:
/// decode (with one bounded repair attempt) -> feature extraction ->
/// tempo reconciliation -> mood classification -> tag write -> audit.
///
/// Re-running on an already-classified file recomputes and overwrites an
/// equivalent result; the tag write is idempotent by design.
pub fn run(file: &Path, config: &AppConfig) -> Result<WorkerOutcome, WorkerError> {
    let file_name = file
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    if !file.exists() {
        println!("[skip] {file_name} no longer exists");
        return Ok(WorkerOutcome::SkippedMissing);
    }

    let cached_embedding = tags::read_cached_embedding(file);
    let cache_note = if cached_embedding.is_some() { "cached embedding" } else { "fresh" };
    println!("[start] {file_name} ({cache_note})");

    // Decode, healing the container once if the decoder faults.
    let mut healed = false;
    let audio = match decode::load_mono(file) {
        Ok(audio) => audio,
        Err(e) => {
            println!("[corrupt] decode fault: {e}; attempting repair");
            match repair::heal_and_verify(file, config.repair_timeout_secs) {
                Ok(()) => {
                    println!("[heal-ok] retrying decode");
                    match decode::load_mono(file) {
                        Ok(audio) => {
                            healed = true;
                            audio
                        }
                        Err(e2) => {
                            return quarantine(file, config, format!("After heal: {e2}"));
                        }
                    }
                }
                Err(repair_err) => {
                    println!("[heal-fail] {repair_err}");
                    return quarantine(file, config, format!("Initial decode fault: {e}"));
                }
            }
        }
    };

    if !audio.is_long_enough() {
        return quarantine(file, config, "Audio empty or too short".to_string());
    }

    // Reloaded fresh per worker process; a missing repository simply yields
    // an empty set and the fallback path.
    let anchor_set = anchors::load_anchors(&config.anchor_dir);

    let (mut classification, mut audit_record) =
        match classify(file, &audio, cached_embedding, &anchor_set) {
            Ok(v) => v,
            Err(reason) => return quarantine(file, config, reason),
        };
    classification.healed = healed;

    if let Err(e) = tags::write_result(file, &classification) {
        // Fail open: no marker written, the track stays VIRGIN and is
        // retried on a later cycle.
        log::warn!("Tag write failed for {}: {}", file.display(), e);
        println!("[warn] tag write failed; track will be retried");
    }

    audit_record.filename = file_name.clone();
    let audit_path = config.anchor_dir.join(audit::AUDIT_FILE_NAME);
    if let Err(e) = audit::append(&audit_path, &audit_record) {
        log::warn!("Audit append failed: {e}");
    }

    println!("[done] {file_name}");
    Ok(WorkerOutcome::Completed)
}

/// Feature extraction through classification. `Err` carries a quarantine
/// reason.
fn classify(
    file: &Path,
    audio: &DecodedAudio,
    cached_embedding: Option<Vec<f32>>,
    anchor_set: &[anchors::ReferenceAnchor],
) -> Result<(tags::ClassificationResult, audit::AuditRecord), String> {
    // Constructed at first need, owned for the rest of this worker process.
    let backend = FeatureBackend::new();

    let spec = backend.spectrogram(&audio.samples, audio.sample_rate);
    let features = features::extract(&audio.samples, &spec);

    println!("  estimate A (energy): {:.2} BPM", features.tempo_energy);
    println!("  estimate B (onset):  {:.2} BPM", features.tempo_onset);

    let embedding = match cached_embedding {
        Some(e) => e,
        None => features::compute_embedding(&spec),
    };

    let anchor_match = anchors::best_match(&embedding, anchor_set);

    let (reconciled, anchor_info, score, confidence) = match &anchor_match {
        Some(m) => {
            println!(
                "  anchor: {} ({}% match)",
                m.anchor.name,
                m.confidence()
            );
            let r = reconcile::reconcile(
                features.tempo_energy,
                features.tempo_onset,
                m.anchor.bpm,
            );
            println!("  decision: {} -> {} BPM", r.method, r.bpm);
            (r, m.descriptor(), m.similarity, m.confidence())
        }
        None => {
            println!("  no anchor matched; using energy estimate");
            let r = reconcile::fallback(features.tempo_energy);
            (r, "None".to_string(), 0.0, 0)
        }
    };

    if !reconcile::is_plausible(reconciled.bpm) {
        return Err(format!("BPM implausible: {}", reconciled.bpm));
    }

    let mood_list = moods::classify(
        reconciled.bpm,
        features.danceability,
        features.intensity,
        features.scale,
    );

    let classification = tags::ClassificationResult {
        bpm: reconciled.bpm,
        key: features.key_string(),
        moods: mood_list,
        danceability: features.danceability,
        intensity: features.intensity,
        embedding,
        anchor_match: anchor_info.clone(),
        confidence,
        healed: false,
    };

    let record = audit::AuditRecord {
        filename: file
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default(),
        action: "UPDATE".to_string(),
        bpm_final: reconciled.bpm,
        method: reconciled.method,
        anchor_ref: anchor_info,
        score,
        confidence,
        estimate_a_raw: features.tempo_energy,
        estimate_b_raw: features.tempo_onset,
    };

    Ok((classification, record))
}

fn quarantine(
    file: &Path,
    config: &AppConfig,
    reason: String,
) -> Result<WorkerOutcome, WorkerError> {
    quarantine::quarantine_file(file, &config.quarantine_dir, &reason)?;
    println!("[quarantined] {reason}");
    Ok(WorkerOutcome::Quarantined(reason))
}
