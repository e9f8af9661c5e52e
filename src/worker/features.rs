use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};

use crate::EMBEDDING_DIM;

const FRAME_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;

/// Mel-spaced band count; mean + std per band form the embedding.
const EMBEDDING_BANDS: usize = EMBEDDING_DIM / 2;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

// Krumhansl-Schmuckler key profiles.
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
        }
    }
}

impl std::fmt::Display for Scale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar features of one track, before tempo reconciliation.
#[derive(Debug, Clone)]
pub struct TrackFeatures {
    /// Tempo estimate A: autocorrelation of the spectral-flux onset envelope.
    pub tempo_energy: f64,
    /// Tempo estimate B: median inter-onset interval of picked envelope
    /// peaks. 0.0 when too few peaks were found.
    pub tempo_onset: f64,
    /// Beat-periodicity strength, scaled to roughly 0..3.
    pub danceability: f64,
    /// Bounded RMS transform, clipped to [0, 1].
    pub intensity: f64,
    pub key: String,
    pub scale: Scale,
}

impl TrackFeatures {
    /// Combined key string as persisted ("A minor").
    pub fn key_string(&self) -> String {
        format!("{} {}", self.key, self.scale)
    }
}

/// STFT magnitudes of a track; both the scalar features and the embedding
/// derive from it, so it is computed once per file.
pub struct Spectrogram {
    frames: Vec<Vec<f32>>,
    frame_rate: f64,
    sample_rate: u32,
}

/// FFT planner and analysis window. Constructed lazily, once per worker
/// process, and owned by the worker rather than living in a global.
pub struct FeatureBackend {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
}

impl FeatureBackend {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FRAME_SIZE);
        let window: Vec<f32> = (0..FRAME_SIZE)
            .map(|i| {
                let x = std::f32::consts::TAU * i as f32 / FRAME_SIZE as f32;
                0.5 - 0.5 * x.cos()
            })
            .collect();
        Self { fft, window }
    }

    pub fn spectrogram(&self, samples: &[f32], sample_rate: u32) -> Spectrogram {
        let mut frames = Vec::new();
        let mut input = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();

        let mut pos = 0;
        while pos + FRAME_SIZE <= samples.len() {
            for (i, slot) in input.iter_mut().enumerate() {
                *slot = samples[pos + i] * self.window[i];
            }
            // Buffer lengths come from the planner, so this cannot fail.
            self.fft.process(&mut input, &mut spectrum).unwrap();
            frames.push(spectrum.iter().map(|c| c.norm()).collect());
            pos += HOP_SIZE;
        }

        Spectrogram {
            frames,
            frame_rate: sample_rate as f64 / HOP_SIZE as f64,
            sample_rate,
        }
    }
}

impl Default for FeatureBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the scalar feature set from decoded audio and its spectrogram.
pub fn extract(samples: &[f32], spec: &Spectrogram) -> TrackFeatures {
    let envelope = onset_envelope(spec);
    let (tempo_energy, periodicity) = tempo_from_autocorrelation(&envelope, spec.frame_rate);
    let tempo_onset = tempo_from_onsets(&envelope, spec.frame_rate);
    let danceability = (periodicity * 3.0).clamp(0.0, 3.0);
    let intensity = (rms(samples) as f64 * 3.5).min(1.0);
    let (key, scale) = estimate_key(spec);

    TrackFeatures {
        tempo_energy,
        tempo_onset,
        danceability,
        intensity,
        key,
        scale,
    }
}

/// Summarize the spectrogram into a fixed-dimension embedding: log-energy
/// mean and std of mel-spaced bands.
pub fn compute_embedding(spec: &Spectrogram) -> Vec<f32> {
    let n_bins = FRAME_SIZE / 2 + 1;
    let nyquist = spec.sample_rate as f64 / 2.0;
    let edges = mel_band_edges(40.0, nyquist * 0.9, EMBEDDING_BANDS);
    let bin_hz = spec.sample_rate as f64 / FRAME_SIZE as f64;

    let mut band_series: Vec<Vec<f64>> = vec![Vec::new(); EMBEDDING_BANDS];
    for frame in &spec.frames {
        for band in 0..EMBEDDING_BANDS {
            let lo = (edges[band] / bin_hz).floor() as usize;
            let hi = ((edges[band + 1] / bin_hz).ceil() as usize).min(n_bins);
            let energy: f64 = frame[lo..hi.max(lo + 1).min(n_bins)]
                .iter()
                .map(|&m| (m as f64) * (m as f64))
                .sum();
            band_series[band].push((1.0 + energy).ln());
        }
    }

    let mut embedding = Vec::with_capacity(EMBEDDING_DIM);
    for series in &band_series {
        let (mean, _) = mean_std(series);
        embedding.push(mean as f32);
    }
    for series in &band_series {
        let (_, std) = mean_std(series);
        embedding.push(std as f32);
    }
    embedding
}

/// Half-wave rectified spectral flux per frame.
fn onset_envelope(spec: &Spectrogram) -> Vec<f64> {
    let mut envelope = Vec::with_capacity(spec.frames.len());
    let mut prev: Option<&Vec<f32>> = None;
    for frame in &spec.frames {
        let flux = match prev {
            Some(p) => frame
                .iter()
                .zip(p.iter())
                .map(|(&cur, &old)| (cur as f64 - old as f64).max(0.0))
                .sum(),
            None => 0.0,
        };
        envelope.push(flux);
        prev = Some(frame);
    }
    envelope
}

/// Tempo estimate A: pick the autocorrelation lag with the most energy in
/// the plausible BPM window. Also returns the normalized peak strength,
/// which feeds danceability.
fn tempo_from_autocorrelation(envelope: &[f64], frame_rate: f64) -> (f64, f64) {
    let (lo_bpm, hi_bpm) = (crate::BPM_LIMITS.0 as f64, crate::BPM_LIMITS.1 as f64);
    let lag_min = ((60.0 * frame_rate / hi_bpm).floor() as usize).max(1);
    let lag_max = ((60.0 * frame_rate / lo_bpm).ceil() as usize).min(envelope.len() / 2);

    if lag_min >= lag_max || envelope.is_empty() {
        return (120.0, 0.0);
    }

    let zero_lag = autocorrelation(envelope, 0);
    if zero_lag < 1e-12 {
        return (120.0, 0.0);
    }

    let mut best_lag = lag_min;
    let mut best_score = f64::MIN;
    for lag in lag_min..=lag_max {
        let score = autocorrelation(envelope, lag);
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }

    let bpm = 60.0 * frame_rate / best_lag as f64;
    let periodicity = (best_score / zero_lag).clamp(0.0, 1.0);
    (bpm, periodicity)
}

fn autocorrelation(envelope: &[f64], lag: usize) -> f64 {
    let n = envelope.len() - lag;
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = (0..n).map(|i| envelope[i] * envelope[i + lag]).sum();
    sum / n as f64
}

/// Tempo estimate B: median interval between picked envelope peaks.
/// Returns 0.0 (unavailable) when fewer than four peaks are found.
fn tempo_from_onsets(envelope: &[f64], frame_rate: f64) -> f64 {
    let peaks = pick_peaks(envelope, frame_rate);
    if peaks.len() < 4 {
        return 0.0;
    }

    let mut intervals: Vec<usize> = peaks.windows(2).map(|w| w[1] - w[0]).collect();
    intervals.sort_unstable();
    let median = intervals[intervals.len() / 2] as f64;
    if median < 1.0 {
        return 0.0;
    }
    60.0 * frame_rate / median
}

/// Local maxima above mean + 0.5*std, at least 100 ms apart.
fn pick_peaks(envelope: &[f64], frame_rate: f64) -> Vec<usize> {
    if envelope.len() < 3 {
        return Vec::new();
    }
    let (mean, std) = mean_std(envelope);
    let threshold = mean + 0.5 * std;
    let min_gap = (0.1 * frame_rate).round() as usize;

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..envelope.len() - 1 {
        if envelope[i] > threshold
            && envelope[i] > envelope[i - 1]
            && envelope[i] >= envelope[i + 1]
        {
            if let Some(&last) = peaks.last() {
                if i - last < min_gap {
                    continue;
                }
            }
            peaks.push(i);
        }
    }
    peaks
}

/// Key estimation: averaged chromagram correlated against the Krumhansl
/// major/minor profiles in all twelve rotations.
fn estimate_key(spec: &Spectrogram) -> (String, Scale) {
    let chroma = average_chroma(spec);

    let mut best = (0usize, Scale::Major, f64::MIN);
    for tonic in 0..12 {
        for (scale, profile) in [(Scale::Major, &MAJOR_PROFILE), (Scale::Minor, &MINOR_PROFILE)] {
            let rotated: Vec<f64> = (0..12).map(|i| profile[(12 + i - tonic) % 12]).collect();
            let score = pearson(&chroma, &rotated);
            if score > best.2 {
                best = (tonic, scale, score);
            }
        }
    }

    (NOTE_NAMES[best.0].to_string(), best.1)
}

fn average_chroma(spec: &Spectrogram) -> Vec<f64> {
    let mut chroma = vec![0.0_f64; 12];
    let bin_hz = spec.sample_rate as f64 / FRAME_SIZE as f64;

    for frame in &spec.frames {
        for (bin, &mag) in frame.iter().enumerate() {
            let freq = bin as f64 * bin_hz;
            if !(55.0..2000.0).contains(&freq) {
                continue;
            }
            let semis = 12.0 * (freq / 440.0).log2();
            // A is pitch class 9 with C = 0.
            let pc = ((semis.round() as i64 + 9).rem_euclid(12)) as usize;
            chroma[pc] += mag as f64;
        }
    }
    chroma
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..a.len() {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        cov / denom
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    ((sum_sq / samples.len() as f64) as f32).sqrt()
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Band edges spaced evenly on the mel scale.
fn mel_band_edges(lo_hz: f64, hi_hz: f64, bands: usize) -> Vec<f64> {
    let to_mel = |hz: f64| 2595.0 * (1.0 + hz / 700.0).log10();
    let from_mel = |mel: f64| 700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0);
    let (lo, hi) = (to_mel(lo_hz), to_mel(hi_hz));
    (0..=bands)
        .map(|i| from_mel(lo + (hi - lo) * i as f64 / bands as f64))
        .collect()
}
