//! # auscult_models
//!
//! Network side of the auscult engine.
//!
//! - [`AudioClassifier`] - the trait the engine runs inference and explanations through
//! - [`AudioSpectrogramTransformer`] - ViT-style encoder over log-mel spectrograms
//! - [`checkpoint`] - named MessagePack weights plus JSON metadata

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod checkpoint;
mod error;
pub mod traits;

pub use ast::{AstConfig, AudioSpectrogramTransformer, NUM_SUMMARY_TOKENS};
pub use checkpoint::{
    load_record, save_model, CheckpointError, CheckpointMetadata, ModelCheckpoint,
};
pub use error::{ModelError, Result};
pub use traits::AudioClassifier;
