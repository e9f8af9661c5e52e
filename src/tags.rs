use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::{FileType, TaggedFileExt};
use lofty::prelude::*;
use lofty::tag::{ItemKey, ItemValue, Tag, TagItem, TagType};
use thiserror::Error;

use crate::{ALGO_VERSION, TIME_FMT};

pub const BPM_TAG: &str = "BPM";
pub const KEY_TAG: &str = "KEY";
pub const MOOD_TAG: &str = "MOOD";
pub const DANCEABILITY_TAG: &str = "DANCEABILITY";
pub const INTENSITY_TAG: &str = "INTENSITY";
pub const EMBEDDING_TAG: &str = "EMBEDDING";
pub const ANCHOR_MATCH_TAG: &str = "ANCHOR_MATCH";
pub const DONE_TAG: &str = "ANALYZE_DONE";
pub const ALGO_VERSION_TAG: &str = "ALGO_VERSION";
pub const MODIFIED_BY_TAG: &str = "MODIFIED_BY";
pub const HEALED_DATE_TAG: &str = "HEALED_DATE";

/// Provenance note written when the self-healer replaced the file contents.
pub const HEALER_SIGNATURE: &str = "anchorbeat-self-healer-ffmpeg";

#[derive(Error, Debug)]
pub enum TagError {
    #[error("tag read error: {0}")]
    Read(#[from] lofty::error::LoftyError),
    #[error("unsupported tag container for {0}")]
    UnsupportedContainer(String),
}

/// Completion state of a track, derived solely from its own metadata.
/// This is the only synchronization signal between concurrent supervisors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Virgin,
    Done,
}

/// The full classification record persisted into a track's tag container.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub bpm: i32,
    pub key: String,
    pub moods: Vec<String>,
    pub danceability: f64,
    pub intensity: f64,
    pub embedding: Vec<f32>,
    pub anchor_match: String,
    pub confidence: i32,
    pub healed: bool,
}

/// The tag container families we write. FLAC and Ogg carry structured Vorbis
/// key/value comments; MP3 and ADTS AAC carry ID3v2 frames; MP4-family files
/// carry ilst atoms (ID3v2 cannot be saved into an MP4 container).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagContainer {
    VorbisComments,
    Id3v2,
    Mp4Ilst,
}

impl TagContainer {
    pub fn for_file(path: &Path) -> Result<Self, TagError> {
        let file_type = FileType::from_path(path);
        match file_type {
            Some(FileType::Flac) | Some(FileType::Vorbis) => Ok(Self::VorbisComments),
            Some(FileType::Mpeg) | Some(FileType::Aac) => Ok(Self::Id3v2),
            Some(FileType::Mp4) => Ok(Self::Mp4Ilst),
            _ => Err(TagError::UnsupportedContainer(path.display().to_string())),
        }
    }

    fn tag_type(self) -> TagType {
        match self {
            Self::VorbisComments => TagType::VorbisComments,
            Self::Id3v2 => TagType::Id3v2,
            Self::Mp4Ilst => TagType::Mp4Ilst,
        }
    }
}

/// Fields lofty knows get its mapped keys, so they land in the proper frame
/// or comment of each container and read back under the same key after a
/// reload. Everything else is a custom field.
fn field_key(name: &str) -> ItemKey {
    match name {
        BPM_TAG => ItemKey::Bpm,
        KEY_TAG => ItemKey::InitialKey,
        MOOD_TAG => ItemKey::Mood,
        _ => ItemKey::Unknown(name.to_string()),
    }
}

fn get_field<'a>(tag: &'a Tag, name: &str) -> Option<&'a str> {
    tag.get_string(&field_key(name))
}

fn read_tag(path: &Path) -> Option<Tag> {
    let tagged = lofty::read_from_path(path).ok()?;
    tagged
        .primary_tag()
        .or_else(|| tagged.first_tag())
        .cloned()
}

/// Check the completion marker. Any read failure means VIRGIN — an
/// unreadable file is simply retried, never skipped forever.
pub fn completion_state(path: &Path) -> TrackState {
    match read_tag(path) {
        Some(tag) => match get_field(&tag, DONE_TAG) {
            Some(ts) if ts.trim().len() > 5 => TrackState::Done,
            _ => TrackState::Virgin,
        },
        None => TrackState::Virgin,
    }
}

/// Read a previously stored embedding, if any. Avoids recomputing the
/// expensive vector on re-runs.
pub fn read_cached_embedding(path: &Path) -> Option<Vec<f32>> {
    let tag = read_tag(path)?;
    let json = get_field(&tag, EMBEDDING_TAG)?;
    serde_json::from_str(json).ok()
}

/// Tags an anchor file must carry: its embedding, and its curated tempo
/// (120 when absent — the historical default of the reference set).
pub struct AnchorTags {
    pub embedding: Vec<f32>,
    pub bpm: f64,
}

pub fn read_anchor_tags(path: &Path) -> Option<AnchorTags> {
    let tag = read_tag(path)?;
    let embedding: Vec<f32> = serde_json::from_str(get_field(&tag, EMBEDDING_TAG)?).ok()?;
    let bpm = get_field(&tag, BPM_TAG)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(120.0);
    Some(AnchorTags { embedding, bpm })
}

/// Persist the full classification result. Writing `ANALYZE_DONE` is the
/// state transition to DONE; a failure here leaves the track VIRGIN so a
/// later cycle retries it.
pub fn write_result(path: &Path, result: &ClassificationResult) -> Result<(), TagError> {
    let container = TagContainer::for_file(path)?;
    let tagged = lofty::read_from_path(path)?;
    let existing = tagged.tag(container.tag_type()).cloned();
    let tag = build_result_tag(container, existing, result);
    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

/// Populate (or refresh) a tag with the classification fields. The marker
/// goes in last; its presence is what flips the track to DONE.
fn build_result_tag(
    container: TagContainer,
    existing: Option<Tag>,
    result: &ClassificationResult,
) -> Tag {
    let mut tag = existing.unwrap_or_else(|| Tag::new(container.tag_type()));
    let now = chrono::Local::now().format(TIME_FMT).to_string();

    set_text(&mut tag, BPM_TAG, result.bpm.to_string());
    set_text(&mut tag, KEY_TAG, result.key.clone());

    // Vorbis comments hold one value per MOOD entry; the other containers
    // get a single comma-joined field.
    remove_field(&mut tag, MOOD_TAG);
    match container {
        TagContainer::VorbisComments => {
            for mood in &result.moods {
                tag.push_unchecked(TagItem::new(
                    field_key(MOOD_TAG),
                    ItemValue::Text(mood.clone()),
                ));
            }
        }
        TagContainer::Id3v2 | TagContainer::Mp4Ilst => {
            set_text(&mut tag, MOOD_TAG, result.moods.join(","));
        }
    }

    set_text(&mut tag, DANCEABILITY_TAG, format!("{:.4}", result.danceability));
    set_text(&mut tag, INTENSITY_TAG, format!("{:.4}", result.intensity));
    set_text(
        &mut tag,
        EMBEDDING_TAG,
        serde_json::to_string(&result.embedding).unwrap_or_else(|_| "[]".to_string()),
    );
    set_text(&mut tag, ANCHOR_MATCH_TAG, result.anchor_match.clone());
    set_text(&mut tag, ALGO_VERSION_TAG, ALGO_VERSION.to_string());

    if result.healed {
        set_text(&mut tag, MODIFIED_BY_TAG, HEALER_SIGNATURE.to_string());
        set_text(&mut tag, HEALED_DATE_TAG, now.clone());
    }

    set_text(&mut tag, DONE_TAG, now);
    tag
}

/// Custom keys fail lofty's per-tag-type mapping check (`insert` and `push`
/// silently drop them), so writes go through the unchecked variants.
/// `insert_unchecked` still replaces any previous item with the same key.
fn set_text(tag: &mut Tag, name: &str, value: String) {
    tag.insert_unchecked(TagItem::new(field_key(name), ItemValue::Text(value)));
}

fn remove_field(tag: &mut Tag, name: &str) {
    tag.remove_key(&field_key(name));
}

/// Read back the moods list, honoring both storage conventions.
pub fn read_moods(path: &Path) -> Vec<String> {
    let Some(tag) = read_tag(path) else {
        return Vec::new();
    };
    let mood_key = field_key(MOOD_TAG);
    let mut moods: Vec<String> = tag
        .items()
        .filter_map(|item| match item.value() {
            ItemValue::Text(v) if *item.key() == mood_key => Some(v.clone()),
            _ => None,
        })
        .collect();
    if moods.len() == 1 && moods[0].contains(',') {
        moods = moods[0].split(',').map(|s| s.trim().to_string()).collect();
    }
    moods
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(moods: &[&str]) -> ClassificationResult {
        ClassificationResult {
            bpm: 128,
            key: "A minor".to_string(),
            moods: moods.iter().map(|m| m.to_string()).collect(),
            danceability: 1.61,
            intensity: 0.72,
            embedding: vec![0.25, -0.5, 1.0],
            anchor_match: "FAST (0.91) - anthem.flac".to_string(),
            confidence: 91,
            healed: false,
        }
    }

    fn field_items<'a>(tag: &'a Tag, name: &str) -> Vec<&'a str> {
        let key = field_key(name);
        tag.items()
            .filter_map(|item| match item.value() {
                ItemValue::Text(v) if *item.key() == key => Some(v.as_str()),
                _ => None,
            })
            .collect()
    }

    /// A valid mono 16-bit PCM WAV, all-zero samples. Enough container for
    /// lofty to attach an ID3v2 tag to.
    fn write_minimal_wav(path: &Path) {
        let data_len: u32 = 8000 * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&8000u32.to_le_bytes());
        bytes.extend_from_slice(&16000u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + data_len as usize, 0);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn container_follows_extension() {
        assert_eq!(
            TagContainer::for_file(Path::new("/x/a.flac")).unwrap(),
            TagContainer::VorbisComments
        );
        assert_eq!(
            TagContainer::for_file(Path::new("/x/a.mp3")).unwrap(),
            TagContainer::Id3v2
        );
        assert_eq!(
            TagContainer::for_file(Path::new("/x/a.m4a")).unwrap(),
            TagContainer::Mp4Ilst
        );
        assert!(TagContainer::for_file(Path::new("/x/a.xyz")).is_err());
    }

    #[test]
    fn unreadable_file_is_virgin() {
        assert_eq!(
            completion_state(Path::new("/nonexistent/file.flac")),
            TrackState::Virgin
        );
    }

    #[test]
    fn missing_file_has_no_cached_embedding() {
        assert!(read_cached_embedding(Path::new("/nonexistent/file.flac")).is_none());
    }

    #[test]
    fn set_text_replaces_previous_value() {
        let mut tag = Tag::new(TagType::VorbisComments);
        set_text(&mut tag, BPM_TAG, "120".to_string());
        set_text(&mut tag, BPM_TAG, "128".to_string());
        assert_eq!(get_field(&tag, BPM_TAG), Some("128"));
        assert_eq!(field_items(&tag, BPM_TAG).len(), 1);

        // Custom fields take the same path and must survive it too.
        set_text(&mut tag, DONE_TAG, "2026-08-25 12:00:00".to_string());
        assert_eq!(get_field(&tag, DONE_TAG), Some("2026-08-25 12:00:00"));
    }

    #[test]
    fn vorbis_moods_are_separate_items() {
        let tag = build_result_tag(
            TagContainer::VorbisComments,
            None,
            &sample_result(&["Groovy", "Cool"]),
        );
        assert_eq!(field_items(&tag, MOOD_TAG), vec!["Groovy", "Cool"]);
    }

    #[test]
    fn rewriting_replaces_instead_of_duplicating() {
        let first = build_result_tag(
            TagContainer::VorbisComments,
            None,
            &sample_result(&["Groovy", "Cool"]),
        );

        let mut updated = sample_result(&["Party"]);
        updated.bpm = 130;
        let second = build_result_tag(TagContainer::VorbisComments, Some(first), &updated);

        assert_eq!(get_field(&second, BPM_TAG), Some("130"));
        assert_eq!(field_items(&second, BPM_TAG).len(), 1);
        assert_eq!(field_items(&second, DONE_TAG).len(), 1);
        assert_eq!(field_items(&second, MOOD_TAG), vec!["Party"]);
    }

    #[test]
    fn written_fields_survive_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_minimal_wav(&path);

        let mut result = sample_result(&["Groovy", "Cool"]);
        result.healed = true;
        let tag = build_result_tag(TagContainer::Id3v2, None, &result);
        tag.save_to_path(&path, WriteOptions::default()).unwrap();

        // Everything must come back through the production read paths,
        // including lofty's key mapping on reload.
        assert_eq!(completion_state(&path), TrackState::Done);
        assert_eq!(read_cached_embedding(&path), Some(vec![0.25, -0.5, 1.0]));
        assert_eq!(read_moods(&path), vec!["Groovy", "Cool"]);

        let anchor = read_anchor_tags(&path).expect("embedding and bpm present");
        assert_eq!(anchor.bpm, 128.0);
        assert_eq!(anchor.embedding, vec![0.25, -0.5, 1.0]);
    }
}
