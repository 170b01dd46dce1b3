//! Fixed-length waveform preparation.

use std::path::{Path, PathBuf};

use auscult_core::{TARGET_LEN, TARGET_SR};

use crate::decode::DecoderChain;
use crate::error::{AudioError, Result};
use crate::resample::{input_len_for, resample_mono};

/// A decoded, mono recording before length normalization.
#[derive(Debug, Clone)]
pub struct AudioSample {
    /// Absolute path the audio was read from.
    pub path: PathBuf,
    /// Mono samples at `sample_rate`.
    pub waveform: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioSample {
    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.waveform.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Right-pad with zeros or truncate to exactly `len` samples.
pub fn fix_length(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    samples.resize(len, 0.0);
    samples
}

/// Turns an audio file into a waveform of exactly `target_len` samples at
/// `target_sr`.
///
/// Steps: resolve the absolute path, decode through the [`DecoderChain`],
/// average channels to mono, resample, then pad or truncate.
///
/// # Example
///
/// ```rust,ignore
/// use auscult_audio::AudioPreprocessor;
///
/// let waveform = AudioPreprocessor::new().preprocess("breath.wav")?;
/// assert_eq!(waveform.len(), auscult_core::TARGET_LEN);
/// ```
#[derive(Debug)]
pub struct AudioPreprocessor {
    decoders: DecoderChain,
    target_sr: u32,
    target_len: usize,
}

impl Default for AudioPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPreprocessor {
    /// Preprocessor with the standard decoder chain and the fixed contract
    /// (`TARGET_SR`, `TARGET_LEN`).
    pub fn new() -> Self {
        Self {
            decoders: DecoderChain::standard(TARGET_SR),
            target_sr: TARGET_SR,
            target_len: TARGET_LEN,
        }
    }

    /// Replace the decoder chain.
    #[must_use]
    pub fn with_decoders(mut self, decoders: DecoderChain) -> Self {
        self.decoders = decoders;
        self
    }

    /// Output sample rate.
    pub fn target_sr(&self) -> u32 {
        self.target_sr
    }

    /// Output length in samples.
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    /// Resolve, check and decode `path` into a mono [`AudioSample`].
    ///
    /// # Errors
    ///
    /// [`AudioError::NotFound`] if the file is missing,
    /// [`AudioError::DecodeFailed`] if every decoder fails.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<AudioSample> {
        let path = std::path::absolute(path.as_ref())?;
        if !path.exists() {
            return Err(AudioError::NotFound { path });
        }

        let decoded = self.decoders.decode(&path)?;
        let sample_rate = decoded.sample_rate;
        if decoded.n_channels() > 1 {
            tracing::debug!("Mixing {} channels to mono", decoded.n_channels());
        }

        Ok(AudioSample {
            path,
            waveform: decoded.into_mono(),
            sample_rate,
        })
    }

    /// Resample and pad/truncate a loaded sample to the fixed contract.
    ///
    /// Input past what the kept output needs is dropped before resampling.
    pub fn conform(&self, mut sample: AudioSample) -> Result<Vec<f32>> {
        let needed = input_len_for(self.target_len, sample.sample_rate, self.target_sr);
        sample.waveform.truncate(needed);

        let waveform = if sample.sample_rate != self.target_sr {
            tracing::debug!(
                "Resampling {} from {} Hz to {} Hz",
                sample.path.display(),
                sample.sample_rate,
                self.target_sr
            );
            resample_mono(&sample.waveform, sample.sample_rate, self.target_sr)?
        } else {
            sample.waveform
        };

        Ok(fix_length(waveform, self.target_len))
    }

    /// Full pipeline: the returned waveform always has `target_len` samples.
    pub fn preprocess(&self, path: impl AsRef<Path>) -> Result<Vec<f32>> {
        let sample = self.load(path)?;
        tracing::debug!(
            "Loaded {} ({:.2}s at {} Hz)",
            sample.path.display(),
            sample.duration_secs(),
            sample.sample_rate
        );
        self.conform(sample)
    }
}
