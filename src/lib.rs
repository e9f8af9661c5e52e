pub mod anchors;
pub mod audit;
pub mod config;
pub mod quarantine;
pub mod snapshot;
pub mod supervisor;
pub mod tags;
pub mod worker;

/// Audio file extensions the pipeline handles.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "m4a", "aac"];

/// Application name for XDG paths.
pub const APP_NAME: &str = "anchorbeat";

/// Stamped into every tag write and quarantine sidecar, so a later audit
/// can tell which revision of the classifier touched a file.
pub const ALGO_VERSION: &str = "2026-08-robust-v2";

/// Plausible tempo range. Anything outside is treated as a classification
/// failure, never written to a file.
pub const BPM_LIMITS: (i32, i32) = (40, 210);

/// Timestamp format shared by tags, audit rows, and sidecar records.
pub const TIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Dimension of the acoustic embedding vector (and of anchor embeddings).
pub const EMBEDDING_DIM: usize = 32;
