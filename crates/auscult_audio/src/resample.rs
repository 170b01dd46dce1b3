//! Sample rate conversion.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{AudioError, Result};

/// Sinc filter length in input samples.
pub(crate) const SINC_LEN: usize = 256;

/// Input samples needed to produce `out_len` samples at `to_rate`, plus one
/// filter length so the last kept output sees real input.
pub(crate) fn input_len_for(out_len: usize, from_rate: u32, to_rate: u32) -> usize {
    let scaled = out_len as u64 * u64::from(from_rate);
    scaled.div_ceil(u64::from(to_rate).max(1)) as usize + SINC_LEN
}

/// Resample a mono signal from `from_rate` to `to_rate`.
///
/// Uses rubato's sinc interpolation with a 256-tap BlackmanHarris2 window.
/// The filter delay is compensated, so the output holds
/// `round(len * to_rate / from_rate)` samples aligned with the input.
pub fn resample_mono(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid sample rates {from_rate} -> {to_rate}"
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    // Single chunk holding the whole signal.
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)
        .map_err(|e| AudioError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let mut output = resampler
        .process(&[samples], None)
        .map_err(|e| AudioError::Resample(e.to_string()))?
        .swap_remove(0);

    // Flush the filter tail until the delayed signal is fully out.
    while output.len() < expected + delay {
        let tail = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?
            .swap_remove(0);
        if tail.is_empty() {
            break;
        }
        output.extend_from_slice(&tail);
    }

    let mut aligned: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    aligned.resize(expected, 0.0);

    tracing::debug!(
        "Resampled {} samples ({} Hz) -> {} samples ({} Hz)",
        samples.len(),
        from_rate,
        aligned.len(),
        to_rate
    );

    Ok(aligned)
}
