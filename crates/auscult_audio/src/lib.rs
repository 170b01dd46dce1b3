//! # auscult_audio
//!
//! Audio input for the auscult engine: decoding, mono mixing, resampling,
//! fixed-length conforming and log-mel feature extraction.
//!
//! ## Example
//!
//! ```rust,ignore
//! use auscult_audio::{AudioPreprocessor, FeatureExtractor, FeatureExtractorConfig};
//!
//! let waveform = AudioPreprocessor::new().preprocess("breath.wav")?;
//! let extractor = FeatureExtractor::new(FeatureExtractorConfig::default())?;
//! let features = extractor.extract(&waveform)?; // (1024, 128)
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod decode;
mod error;
mod fbank;
mod preprocess;
mod resample;

pub use decode::{
    AudioDecoder, DecodedAudio, DecoderChain, FfmpegDecoder, HoundDecoder, SymphoniaDecoder,
};
pub use error::{AudioError, DecodeAttempt, Result};
pub use fbank::{FeatureExtractor, FeatureExtractorConfig};
pub use preprocess::{fix_length, AudioPreprocessor, AudioSample};
pub use resample::resample_mono;
