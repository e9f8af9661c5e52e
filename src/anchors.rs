use std::path::Path;

use walkdir::WalkDir;

use crate::tags;

/// Similarity must strictly exceed this for an anchor match to be trusted.
pub const MATCH_THRESHOLD: f64 = 0.70;

/// Tempo bracket of a curated reference track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorCategory {
    Fast,
    Mid,
    Slow,
}

impl AnchorCategory {
    pub const ALL: [AnchorCategory; 3] = [Self::Fast, Self::Mid, Self::Slow];

    /// Subdirectory name inside the anchor repository.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Fast => "FAST",
            Self::Mid => "MID",
            Self::Slow => "SLOW",
        }
    }
}

impl std::fmt::Display for AnchorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A curated reference track with known-correct tempo and embedding.
#[derive(Debug, Clone)]
pub struct ReferenceAnchor {
    pub category: AnchorCategory,
    pub name: String,
    pub embedding: Vec<f32>,
    pub bpm: f64,
}

/// Best anchor for a track embedding, with its cosine similarity.
#[derive(Debug, Clone)]
pub struct AnchorMatch<'a> {
    pub anchor: &'a ReferenceAnchor,
    pub similarity: f64,
}

impl AnchorMatch<'_> {
    /// Free-text descriptor persisted as `ANCHOR_MATCH`.
    pub fn descriptor(&self) -> String {
        format!(
            "{} ({:.2}) - {}",
            self.anchor.category, self.similarity, self.anchor.name
        )
    }

    pub fn confidence(&self) -> i32 {
        (self.similarity * 100.0).round() as i32
    }
}

/// Load every valid anchor from the category subdirectories. Entries without
/// a stored embedding are skipped; a missing repository yields an empty set
/// (classification then falls back to the raw estimate).
pub fn load_anchors(anchor_dir: &Path) -> Vec<ReferenceAnchor> {
    let mut anchors = Vec::new();

    for category in AnchorCategory::ALL {
        let cat_dir = anchor_dir.join(category.dir_name());
        if !cat_dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&cat_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if !crate::SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }

            match tags::read_anchor_tags(path) {
                Some(meta) => anchors.push(ReferenceAnchor {
                    category,
                    name: entry.file_name().to_string_lossy().into_owned(),
                    embedding: meta.embedding,
                    bpm: meta.bpm,
                }),
                None => {
                    log::debug!("Skipping anchor without embedding: {}", path.display());
                }
            }
        }
    }

    log::info!("Loaded {} reference anchors", anchors.len());
    anchors
}

/// Find the single most similar anchor, gated at strictly > 0.70 similarity.
/// Anchors whose embedding dimension differs from the track's are treated as
/// having no embedding at all.
pub fn best_match<'a>(
    embedding: &[f32],
    anchors: &'a [ReferenceAnchor],
) -> Option<AnchorMatch<'a>> {
    let mut best: Option<AnchorMatch<'a>> = None;

    for anchor in anchors {
        if anchor.embedding.len() != embedding.len() {
            continue;
        }
        let similarity = cosine_similarity(embedding, &anchor.embedding);
        if best.as_ref().map_or(true, |b| similarity > b.similarity) {
            best = Some(AnchorMatch { anchor, similarity });
        }
    }

    best.filter(|m| m.similarity > MATCH_THRESHOLD)
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for i in 0..a.len() {
        dot += a[i] as f64 * b[i] as f64;
        norm_a += a[i] as f64 * a[i] as f64;
        norm_b += b[i] as f64 * b[i] as f64;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(category: AnchorCategory, name: &str, embedding: Vec<f32>, bpm: f64) -> ReferenceAnchor {
        ReferenceAnchor {
            category,
            name: name.to_string(),
            embedding,
            bpm,
        }
    }

    #[test]
    fn test_cosine_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, -2.0, -3.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn gate_is_strictly_greater_than_threshold() {
        // cos(angle) == 0.70 exactly: construct via [0.7, sqrt(1-0.49)] vs [1, 0].
        let track = vec![1.0_f32, 0.0];
        let at_threshold = vec![0.70_f32, (1.0_f32 - 0.49).sqrt()];
        let above = vec![0.71_f32, (1.0_f32 - 0.71_f32 * 0.71_f32).sqrt()];

        let anchors = vec![anchor(AnchorCategory::Mid, "edge.flac", at_threshold, 100.0)];
        assert!(best_match(&track, &anchors).is_none());

        let anchors = vec![anchor(AnchorCategory::Mid, "edge.flac", above, 100.0)];
        let m = best_match(&track, &anchors).expect("0.71 passes the gate");
        assert!(m.similarity > MATCH_THRESHOLD);
        assert_eq!(m.confidence(), 71);
    }

    #[test]
    fn dimension_mismatch_is_no_embedding() {
        let track = vec![1.0_f32, 0.0];
        let anchors = vec![anchor(AnchorCategory::Fast, "wrong_dim.flac", vec![1.0, 0.0, 0.0], 160.0)];
        assert!(best_match(&track, &anchors).is_none());
    }

    #[test]
    fn keeps_single_best_match() {
        let track = vec![1.0_f32, 0.0];
        let anchors = vec![
            anchor(AnchorCategory::Slow, "far.flac", vec![0.75, 0.66], 70.0),
            anchor(AnchorCategory::Fast, "near.flac", vec![0.99, 0.14], 170.0),
        ];
        let m = best_match(&track, &anchors).unwrap();
        assert_eq!(m.anchor.name, "near.flac");
    }

    #[test]
    fn descriptor_format() {
        let a = anchor(AnchorCategory::Fast, "anthem.flac", vec![1.0], 160.0);
        let m = AnchorMatch {
            anchor: &a,
            similarity: 0.914,
        };
        assert_eq!(m.descriptor(), "FAST (0.91) - anthem.flac");
    }

    #[test]
    fn missing_repository_loads_empty() {
        let anchors = load_anchors(Path::new("/nonexistent/anchors"));
        assert!(anchors.is_empty());
    }
}
