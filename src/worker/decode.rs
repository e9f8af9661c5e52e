use std::path::Path;

use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("probe failed: {0}")]
    Probe(String),
    #[error("no audio track found")]
    NoTrack,
    #[error("decode fault: {0}")]
    Fault(String),
    #[error("decoded zero audio samples")]
    Empty,
}

/// Decoded mono audio plus the source sample rate.
#[derive(Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// The repair-verification floor: at least one second of audio.
    pub fn is_long_enough(&self) -> bool {
        self.samples.len() >= self.sample_rate as usize
    }
}

/// Decode an audio file to mono f32 samples with symphonia. Any mid-stream
/// decoder error is fatal here — the caller decides whether to attempt a
/// repair.
pub fn load_mono(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Probe(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or(DecodeError::NoTrack)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Fault(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(DecodeError::Fault(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| DecodeError::Fault(e.to_string()))?;
        mix_into_mono(&decoded, &mut samples);
    }

    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Average all channels of a decoded buffer into the mono accumulator.
fn mix_into_mono(buf: &AudioBufferRef, out: &mut Vec<f32>) {
    match buf {
        AudioBufferRef::F32(b) => mix_planes(b.planes().planes(), out, |&v| v),
        AudioBufferRef::F64(b) => mix_planes(b.planes().planes(), out, |&v| v as f32),
        AudioBufferRef::S8(b) => mix_planes(b.planes().planes(), out, |&v| v as f32 / 128.0),
        AudioBufferRef::S16(b) => mix_planes(b.planes().planes(), out, |&v| v as f32 / 32768.0),
        AudioBufferRef::S24(b) => {
            mix_planes(b.planes().planes(), out, |v| v.inner() as f32 / 8_388_608.0)
        }
        AudioBufferRef::S32(b) => {
            mix_planes(b.planes().planes(), out, |&v| v as f32 / 2_147_483_648.0)
        }
        AudioBufferRef::U8(b) => {
            mix_planes(b.planes().planes(), out, |&v| (v as f32 - 128.0) / 128.0)
        }
        AudioBufferRef::U16(b) => {
            mix_planes(b.planes().planes(), out, |&v| (v as f32 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(b) => mix_planes(b.planes().planes(), out, |v| {
            (v.inner() as f32 - 8_388_608.0) / 8_388_608.0
        }),
        AudioBufferRef::U32(b) => mix_planes(b.planes().planes(), out, |&v| {
            (v as f64 - 2_147_483_648.0) as f32 / 2_147_483_648.0
        }),
    }
}

fn mix_planes<T, F>(planes: &[&[T]], out: &mut Vec<f32>, convert: F)
where
    F: Fn(&T) -> f32,
{
    if planes.is_empty() {
        return;
    }
    let num_channels = planes.len();
    let num_frames = planes[0].len();

    if num_channels == 1 {
        out.extend(planes[0].iter().map(convert));
        return;
    }

    let scale = 1.0 / num_channels as f32;
    out.extend((0..num_frames).map(|i| {
        let sum: f32 = planes.iter().map(|ch| convert(&ch[i])).sum();
        sum * scale
    }));
}
