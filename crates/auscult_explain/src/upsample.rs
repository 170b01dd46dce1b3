//! Bilinear resizing of 2-D maps.

use ndarray::{Array2, ArrayView2};

use crate::error::{ExplainError, Result};

/// Resize `input` to `(rows, cols)` with bilinear interpolation.
///
/// Uses half-pixel centers (`align_corners = false`): output sample `i`
/// reads source coordinate `(i + 0.5) * in / out - 0.5`, clamped to the
/// edges.
pub fn bilinear_resize(
    input: ArrayView2<'_, f32>,
    (rows, cols): (usize, usize),
) -> Result<Array2<f32>> {
    let (in_rows, in_cols) = input.dim();
    if in_rows == 0 || in_cols == 0 || rows == 0 || cols == 0 {
        return Err(ExplainError::ShapeMismatch(format!(
            "cannot resize {in_rows}x{in_cols} to {rows}x{cols}"
        )));
    }

    let row_taps: Vec<Tap> = (0..rows).map(|i| Tap::new(i, in_rows, rows)).collect();
    let col_taps: Vec<Tap> = (0..cols).map(|j| Tap::new(j, in_cols, cols)).collect();

    Ok(Array2::from_shape_fn((rows, cols), |(i, j)| {
        let r = &row_taps[i];
        let c = &col_taps[j];
        let top = input[[r.lo, c.lo]] * (1.0 - c.frac) + input[[r.lo, c.hi]] * c.frac;
        let bottom = input[[r.hi, c.lo]] * (1.0 - c.frac) + input[[r.hi, c.hi]] * c.frac;
        top * (1.0 - r.frac) + bottom * r.frac
    }))
}

/// Two source indices and the weight of the upper one.
struct Tap {
    lo: usize,
    hi: usize,
    frac: f32,
}

impl Tap {
    fn new(dst: usize, in_len: usize, out_len: usize) -> Self {
        let scale = in_len as f32 / out_len as f32;
        let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
        let lo = (src.floor() as usize).min(in_len - 1);
        let hi = (lo + 1).min(in_len - 1);
        Self {
            lo,
            hi,
            frac: src - lo as f32,
        }
    }
}
