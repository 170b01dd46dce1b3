//! # auscult_core
//!
//! Core types shared by the auscult crates.
//!
//! This crate provides:
//! - The fixed audio contract ([`TARGET_SR`], [`TARGET_LEN`])
//! - [`Label`] and [`ClassificationResult`] for the two-class lung sound model
//! - [`ImportanceMap`], the normalized `(time, freq)` map every explainer returns
//! - Backend aliases selected by cargo features
//! - Error types
//!
//! ## Shape Convention
//!
//! Spectrogram-like data follows `(T, F)`:
//! - `T`: time frames (rows)
//! - `F`: frequency bins (columns)
//!
//! Model inputs add a leading batch axis: `(1, T, F)`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod label;
mod map;

pub use error::{CoreError, Result};
pub use label::{softmax, ClassificationResult, Label, NUM_CLASSES};
pub use map::{normalize01, ImportanceMap, NORMALIZE_EPS};

/// Sample rate every waveform is resampled to, in Hz.
pub const TARGET_SR: u32 = 16_000;

/// Fixed analysis window, in seconds.
pub const TARGET_DURATION_SECS: usize = 10;

/// Fixed waveform length in samples (`TARGET_SR` × 10 s).
pub const TARGET_LEN: usize = TARGET_SR as usize * TARGET_DURATION_SECS;

/// Backend type aliases for convenience.
pub mod backend {
    use burn::tensor::backend::Backend;

    pub use burn_autodiff::Autodiff;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-wgpu")]
    pub use burn_wgpu::Wgpu;

    /// Backend the engine runs on: WGPU when enabled, otherwise CPU ndarray.
    #[cfg(feature = "backend-wgpu")]
    pub type DefaultBackend = Autodiff<Wgpu>;

    /// Backend the engine runs on: WGPU when enabled, otherwise CPU ndarray.
    #[cfg(all(feature = "backend-ndarray", not(feature = "backend-wgpu")))]
    pub type DefaultBackend = Autodiff<NdArray>;

    /// Kind of compute device a model is bound to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DeviceKind {
        /// Host CPU.
        Cpu,
        /// Hardware accelerator (the adapter may still fall back to CPU).
        Gpu,
    }

    impl std::fmt::Display for DeviceKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                DeviceKind::Cpu => f.write_str("cpu"),
                DeviceKind::Gpu => f.write_str("gpu"),
            }
        }
    }

    /// Device kind of [`DefaultBackend`].
    #[must_use]
    pub const fn default_device_kind() -> DeviceKind {
        if cfg!(feature = "backend-wgpu") {
            DeviceKind::Gpu
        } else {
            DeviceKind::Cpu
        }
    }

    /// Default device of [`DefaultBackend`].
    ///
    /// For WGPU this is the best available adapter; for ndarray it is the CPU.
    #[cfg(any(feature = "backend-ndarray", feature = "backend-wgpu"))]
    #[must_use]
    pub fn default_device() -> <DefaultBackend as Backend>::Device {
        Default::default()
    }
}
