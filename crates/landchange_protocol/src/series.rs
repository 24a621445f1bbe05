//! Per-pixel inputs and change-detection outputs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSeriesError {
    #[error("Time series has no observations")]
    Empty,

    #[error("Band '{band}' has {got} observations, expected {expected}")]
    LengthMismatch {
        band: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Parallel observation sequences for one pixel, one entry per date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    /// Observation dates as ordinal day counts.
    pub dates: Vec<i64>,
    pub blues: Vec<f64>,
    pub greens: Vec<f64>,
    pub reds: Vec<f64>,
    pub nirs: Vec<f64>,
    pub swir1s: Vec<f64>,
    pub swir2s: Vec<f64>,
    pub thermals: Vec<f64>,
    pub quality: Vec<u16>,
}

impl TimeSeriesRecord {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Check that every sequence is non-empty and as long as `dates`.
    pub fn validate(&self) -> Result<(), TimeSeriesError> {
        let expected = self.dates.len();
        if expected == 0 {
            return Err(TimeSeriesError::Empty);
        }
        let lengths = [
            ("blues", self.blues.len()),
            ("greens", self.greens.len()),
            ("reds", self.reds.len()),
            ("nirs", self.nirs.len()),
            ("swir1s", self.swir1s.len()),
            ("swir2s", self.swir2s.len()),
            ("thermals", self.thermals.len()),
            ("quality", self.quality.len()),
        ];
        for (band, got) in lengths {
            if got != expected {
                return Err(TimeSeriesError::LengthMismatch {
                    band,
                    expected,
                    got,
                });
            }
        }
        Ok(())
    }
}

/// Spectral change magnitude per band at a segment's break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandMagnitudes {
    pub blue: f64,
    pub green: f64,
    pub red: f64,
    pub nir: f64,
    pub swir1: f64,
    pub swir2: f64,
    pub thermal: f64,
}

/// One interval of stable spectral behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeModel {
    pub start_day: i64,
    pub end_day: i64,
    pub break_day: i64,
    pub observation_count: u32,
    /// 1.0 when the segment ends in a confirmed break.
    pub change_probability: f64,
    pub curve_qa: i32,
    pub magnitudes: BandMagnitudes,
}

impl ChangeModel {
    pub fn has_break(&self) -> bool {
        self.change_probability >= 1.0
    }

    pub fn covers(&self, ordinal: i64) -> bool {
        self.start_day <= ordinal && ordinal <= self.end_day
    }
}

/// Temporally ordered, non-overlapping segments for one pixel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeModelSet {
    pub models: Vec<ChangeModel>,
}

impl ChangeModelSet {
    pub fn new(models: Vec<ChangeModel>) -> Self {
        Self { models }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeModel> {
        self.models.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> TimeSeriesRecord {
        TimeSeriesRecord {
            dates: (0..n as i64).map(|d| 724_000 + d * 16).collect(),
            blues: vec![0.0; n],
            greens: vec![0.0; n],
            reds: vec![0.0; n],
            nirs: vec![0.0; n],
            swir1s: vec![0.0; n],
            swir2s: vec![0.0; n],
            thermals: vec![0.0; n],
            quality: vec![0; n],
        }
    }

    #[test]
    fn validate_accepts_aligned_series() {
        assert_eq!(series(12).validate(), Ok(()));
        assert_eq!(series(12).len(), 12);
    }

    #[test]
    fn validate_rejects_empty_series() {
        assert_eq!(series(0).validate(), Err(TimeSeriesError::Empty));
    }

    #[test]
    fn validate_names_the_short_band() {
        let mut s = series(4);
        s.swir2s.pop();
        assert_eq!(
            s.validate(),
            Err(TimeSeriesError::LengthMismatch {
                band: "swir2s",
                expected: 4,
                got: 3
            })
        );
    }

    #[test]
    fn model_break_and_coverage() {
        let model = ChangeModel {
            start_day: 10,
            end_day: 20,
            break_day: 21,
            observation_count: 8,
            change_probability: 1.0,
            curve_qa: 8,
            magnitudes: BandMagnitudes::default(),
        };
        assert!(model.has_break());
        assert!(model.covers(10) && model.covers(20));
        assert!(!model.covers(21));
    }
}
