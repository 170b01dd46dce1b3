//! Kaldi-compatible log-mel filterbank feature extraction.
//!
//! Reproduces the input representation Audio Spectrogram Transformer
//! checkpoints are trained on: 25 ms Hann frames every 10 ms, DC removal,
//! pre-emphasis, power spectrum, mel filters on the `1127·ln(1 + f/700)`
//! scale, natural log, fixed frame count and mean/std normalization.

use std::f32::consts::PI;
use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;
use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result};

/// Configuration of the filterbank extractor.
///
/// Field names follow the `preprocessor_config.json` shipped with AST
/// checkpoints, so such a file can be read directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureExtractorConfig {
    /// Number of mel bins (frequency axis).
    #[serde(alias = "num_mel_bins")]
    pub feature_size: usize,
    /// Expected input sample rate in Hz.
    pub sampling_rate: u32,
    /// Frames after padding/truncation (time axis).
    pub max_length: usize,
    /// Dataset mean used for normalization.
    pub mean: f32,
    /// Dataset standard deviation used for normalization.
    pub std: f32,
    /// Whether to apply `(x - mean) / (2 * std)`.
    pub do_normalize: bool,
    /// Frame length in milliseconds.
    pub frame_length_ms: f32,
    /// Frame shift in milliseconds.
    pub frame_shift_ms: f32,
    /// Pre-emphasis coefficient.
    pub preemphasis: f32,
    /// Lowest mel filter edge in Hz.
    pub low_freq: f32,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            feature_size: 128,
            sampling_rate: auscult_core::TARGET_SR,
            max_length: 1024,
            mean: -4.267_739_3,
            std: 4.568_997_4,
            do_normalize: true,
            frame_length_ms: 25.0,
            frame_shift_ms: 10.0,
            preemphasis: 0.97,
            low_freq: 20.0,
        }
    }
}

impl FeatureExtractorConfig {
    /// Read a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| AudioError::InvalidConfig(e.to_string()))
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AudioError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Set the number of mel bins.
    #[must_use]
    pub fn with_feature_size(mut self, feature_size: usize) -> Self {
        self.feature_size = feature_size;
        self
    }

    /// Set the number of output frames.
    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Samples per analysis frame.
    pub fn window_size(&self) -> usize {
        (self.sampling_rate as f32 * self.frame_length_ms / 1000.0).round() as usize
    }

    /// Samples between frame starts.
    pub fn window_shift(&self) -> usize {
        (self.sampling_rate as f32 * self.frame_shift_ms / 1000.0).round() as usize
    }

    /// FFT size: window size rounded up to a power of two.
    pub fn fft_size(&self) -> usize {
        self.window_size().next_power_of_two()
    }

    /// Number of frames produced from `n_samples` before padding.
    pub fn n_frames(&self, n_samples: usize) -> usize {
        let win = self.window_size();
        if n_samples < win {
            0
        } else {
            1 + (n_samples - win) / self.window_shift()
        }
    }

    fn validate(&self) -> Result<()> {
        let nyquist = self.sampling_rate as f32 / 2.0;
        if self.feature_size == 0 || self.max_length == 0 {
            return Err(AudioError::InvalidConfig(
                "feature_size and max_length must be positive".to_string(),
            ));
        }
        if self.window_size() == 0 || self.window_shift() == 0 {
            return Err(AudioError::InvalidConfig(format!(
                "frame length {} ms / shift {} ms give an empty window at {} Hz",
                self.frame_length_ms, self.frame_shift_ms, self.sampling_rate
            )));
        }
        if !(0.0..nyquist).contains(&self.low_freq) {
            return Err(AudioError::InvalidConfig(format!(
                "low_freq {} outside [0, {nyquist})",
                self.low_freq
            )));
        }
        if self.do_normalize && self.std <= 0.0 {
            return Err(AudioError::InvalidConfig("std must be positive".to_string()));
        }
        Ok(())
    }
}

/// Converts a fixed-length waveform into a `(time, freq)` log-mel matrix.
pub struct FeatureExtractor {
    config: FeatureExtractorConfig,
    window: Vec<f32>,
    mel_filters: Vec<Vec<f32>>,
    fft: Arc<dyn RealToComplex<f32>>,
}

struct FrameWorkspace {
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl FeatureExtractor {
    /// Build an extractor, precomputing the window and mel filters.
    pub fn new(config: FeatureExtractorConfig) -> Result<Self> {
        config.validate()?;
        let fft_size = config.fft_size();
        let window = hann_window(config.window_size());
        let mel_filters = build_mel_filters(&config);
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);

        Ok(Self {
            config,
            window,
            mel_filters,
            fft,
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &FeatureExtractorConfig {
        &self.config
    }

    /// Output shape `(max_length, feature_size)`.
    pub fn output_shape(&self) -> (usize, usize) {
        (self.config.max_length, self.config.feature_size)
    }

    /// Extract normalized log-mel features.
    ///
    /// Frames beyond the signal are zero before normalization; frames past
    /// `max_length` are dropped.
    pub fn extract(&self, waveform: &[f32]) -> Result<Array2<f32>> {
        if waveform.iter().any(|s| !s.is_finite()) {
            return Err(AudioError::FeatureExtraction(
                "waveform contains non-finite samples".to_string(),
            ));
        }

        let (max_frames, n_mels) = self.output_shape();
        let n_frames = self.config.n_frames(waveform.len()).min(max_frames);
        let win = self.config.window_size();
        let shift = self.config.window_shift();

        let mut features = vec![0.0f32; max_frames * n_mels];
        let fft = &self.fft;

        features[..n_frames * n_mels]
            .par_chunks_mut(n_mels)
            .enumerate()
            .try_for_each_init(
                || FrameWorkspace {
                    input: fft.make_input_vec(),
                    spectrum: fft.make_output_vec(),
                    scratch: fft.make_scratch_vec(),
                },
                |ws, (frame_idx, row)| {
                    let start = frame_idx * shift;
                    self.frame_log_mel(&waveform[start..start + win], ws, row)
                },
            )?;

        if self.config.do_normalize {
            let (mean, denom) = (self.config.mean, 2.0 * self.config.std);
            features.iter_mut().for_each(|v| *v = (*v - mean) / denom);
        }

        Array2::from_shape_vec((max_frames, n_mels), features)
            .map_err(|e| AudioError::FeatureExtraction(e.to_string()))
    }

    fn frame_log_mel(&self, frame: &[f32], ws: &mut FrameWorkspace, out: &mut [f32]) -> Result<()> {
        let win = frame.len();
        let mean = frame.iter().sum::<f32>() / win as f32;

        ws.input.iter_mut().for_each(|v| *v = 0.0);
        for i in (0..win).rev() {
            let prev = if i == 0 { frame[0] } else { frame[i - 1] } - mean;
            let cur = frame[i] - mean;
            ws.input[i] = (cur - self.config.preemphasis * prev) * self.window[i];
        }

        self.fft
            .process_with_scratch(&mut ws.input, &mut ws.spectrum, &mut ws.scratch)
            .map_err(|e| AudioError::FeatureExtraction(e.to_string()))?;

        for (mel, filter) in out.iter_mut().zip(&self.mel_filters) {
            let energy: f32 = filter
                .iter()
                .zip(&ws.spectrum)
                .filter(|(w, _)| **w != 0.0)
                .map(|(w, c)| w * c.norm_sqr())
                .sum();
            *mel = energy.max(f32::EPSILON).ln();
        }
        Ok(())
    }
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Symmetric Hann window.
fn hann_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / (size as f32 - 1.0)).cos())
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

/// Triangular filters over the `fft_size / 2 + 1` spectrum bins.
///
/// Slopes are computed in the mel domain; the Nyquist bin always has zero
/// weight.
fn build_mel_filters(config: &FeatureExtractorConfig) -> Vec<Vec<f32>> {
    let fft_size = config.fft_size();
    let n_fft_bins = fft_size / 2;
    let bin_width = config.sampling_rate as f32 / fft_size as f32;
    let mel_low = hz_to_mel(config.low_freq);
    let mel_high = hz_to_mel(config.sampling_rate as f32 / 2.0);
    let delta = (mel_high - mel_low) / (config.feature_size + 1) as f32;

    let bin_mels: Vec<f32> = (0..n_fft_bins)
        .map(|i| hz_to_mel(bin_width * i as f32))
        .collect();

    (0..config.feature_size)
        .map(|m| {
            let left = mel_low + m as f32 * delta;
            let center = left + delta;
            let right = center + delta;

            let mut filter: Vec<f32> = bin_mels
                .iter()
                .map(|&mel| {
                    let up = (mel - left) / (center - left);
                    let down = (right - mel) / (right - center);
                    up.min(down).max(0.0)
                })
                .collect();
            filter.push(0.0);
            filter
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / 16_000.0).sin())
            .collect()
    }

    #[test]
    fn test_default_geometry() {
        let config = FeatureExtractorConfig::default();
        assert_eq!(config.window_size(), 400);
        assert_eq!(config.window_shift(), 160);
        assert_eq!(config.fft_size(), 512);
        assert_eq!(config.n_frames(auscult_core::TARGET_LEN), 998);
        assert_eq!(config.n_frames(399), 0);
    }

    #[test]
    fn test_output_shape_for_target_len() {
        let extractor = FeatureExtractor::new(FeatureExtractorConfig::default()).unwrap();
        let features = extractor.extract(&vec![0.0; auscult_core::TARGET_LEN]).unwrap();
        assert_eq!(features.dim(), (1024, 128));
    }

    #[test]
    fn test_padding_rows_are_normalized_zeros() {
        let config = FeatureExtractorConfig::default();
        let expected = (0.0 - config.mean) / (2.0 * config.std);
        let extractor = FeatureExtractor::new(config).unwrap();
        let features = extractor.extract(&tone(500.0, 16_000)).unwrap();

        // 1 s of audio gives 98 frames; everything after is padding.
        assert!(features.row(98).iter().all(|v| (v - expected).abs() < 1e-6));
        assert!(features.row(10).iter().any(|v| (v - expected).abs() > 1e-3));
    }

    #[test]
    fn test_tone_peaks_at_matching_mel_bin() {
        let config = FeatureExtractorConfig {
            do_normalize: false,
            ..Default::default()
        };
        let extractor = FeatureExtractor::new(config).unwrap();
        let features = extractor.extract(&tone(1000.0, 16_000)).unwrap();

        let row = features.row(50);
        let peak = row
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |b, (i, &v)| if v > b.1 { (i, v) } else { b })
            .0;
        assert!((42..=46).contains(&peak), "peak bin {peak}");
    }

    #[test]
    fn test_deterministic() {
        let extractor = FeatureExtractor::new(FeatureExtractorConfig::default()).unwrap();
        let x = tone(300.0, 32_000);
        assert_eq!(extractor.extract(&x).unwrap(), extractor.extract(&x).unwrap());
    }

    #[test]
    fn test_mel_filters_shape() {
        let config = FeatureExtractorConfig::default();
        let filters = build_mel_filters(&config);
        assert_eq!(filters.len(), 128);
        assert!(filters.iter().all(|f| f.len() == 257 && f[256] == 0.0));
        assert!(filters.iter().flatten().all(|&w| (0.0..=1.0).contains(&w)));
    }

    #[test]
    fn test_rejects_non_finite_waveform() {
        let extractor = FeatureExtractor::new(FeatureExtractorConfig::default()).unwrap();
        assert!(extractor.extract(&[0.0, f32::NAN]).is_err());
    }

    #[test]
    fn test_config_json_roundtrip_with_alias() {
        let json = r#"{"num_mel_bins": 64, "max_length": 512}"#;
        let config: FeatureExtractorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.feature_size, 64);
        assert_eq!(config.max_length, 512);
        assert_eq!(config.sampling_rate, 16_000);
    }
}
