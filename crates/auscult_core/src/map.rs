//! Normalized time×frequency maps.

use ndarray::Array2;
use serde::ser::{Serialize, Serializer};

use crate::error::{CoreError, Result};

/// Epsilon added to the value range during min-max normalization.
pub const NORMALIZE_EPS: f32 = 1e-8;

/// Min-max normalize in place to `[0, 1]`.
///
/// A constant input maps to all zeros instead of dividing by zero.
pub fn normalize01(values: &mut Array2<f32>) {
    if values.is_empty() {
        return;
    }
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    values.mapv_inplace(|v| v - min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let denom = max + NORMALIZE_EPS;
    values.mapv_inplace(|v| (v / denom).clamp(0.0, 1.0));
}

/// A 2-D `(time, freq)` map with every element in `[0, 1]`.
///
/// Used both for importance maps and for the background spectrogram an
/// overlay is drawn on. Serializes as a nested array of rows.
///
/// # Example
///
/// ```rust
/// use auscult_core::ImportanceMap;
/// use ndarray::array;
///
/// let map = ImportanceMap::normalize(array![[2.0, 4.0], [6.0, 10.0]]).unwrap();
/// assert_eq!(map.shape(), (2, 2));
/// assert!(map.values().iter().all(|v| (0.0..=1.0).contains(v)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceMap {
    values: Array2<f32>,
}

impl ImportanceMap {
    /// Normalize a raw map to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Fails on an empty array or one that contains NaN/infinite values.
    pub fn normalize(mut raw: Array2<f32>) -> Result<Self> {
        if raw.is_empty() {
            return Err(CoreError::EmptyMap(format!("shape {:?}", raw.dim())));
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::NonFinite("importance map".to_string()));
        }
        normalize01(&mut raw);
        Ok(Self { values: raw })
    }

    /// Build a map from row-major data, normalizing it.
    pub fn from_shape_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        let raw = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| CoreError::ShapeMismatch(e.to_string()))?;
        Self::normalize(raw)
    }

    /// An all-zero map, the value of "no attribution".
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            values: Array2::zeros((rows, cols)),
        }
    }

    /// `(time, freq)` dimensions.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Number of time frames.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of frequency bins.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    /// Borrow the normalized values.
    #[must_use]
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }
}

impl Serialize for ImportanceMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.values.rows().into_iter().map(|r| r.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalize_range() {
        let map = ImportanceMap::normalize(array![[-3.0, 0.0], [1.0, 5.0]]).unwrap();
        let v = map.values();
        assert!(v[[0, 0]].abs() < 1e-6);
        assert!((v[[1, 1]] - 1.0).abs() < 1e-5);
        assert!(v.iter().all(|x| (0.0..=1.0).contains(x)));
    }

    #[test]
    fn test_normalize_constant_is_zero() {
        let map = ImportanceMap::normalize(Array2::from_elem((3, 4), 7.5)).unwrap();
        assert!(map.values().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_normalize_rejects_nan_and_empty() {
        assert!(ImportanceMap::normalize(array![[1.0, f32::NAN]]).is_err());
        assert!(ImportanceMap::normalize(Array2::zeros((0, 4))).is_err());
    }

    #[test]
    fn test_from_shape_vec() {
        let map = ImportanceMap::from_shape_vec(2, 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(map.shape(), (2, 3));
        assert!(ImportanceMap::from_shape_vec(2, 2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_zeros() {
        let map = ImportanceMap::zeros(4, 3);
        assert_eq!(map.shape(), (4, 3));
        assert!(map.values().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_serialize_rows() {
        let map = ImportanceMap::normalize(array![[0.0, 1.0], [1.0, 0.0]]).unwrap();
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0].as_array().unwrap().len(), 2);
    }
}
