//! Record keys and the per-record error-carrying contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Coordinates and tags
// ============================================================================

/// Integer grid coordinate of a chip, tile or pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PixelCoordinate {
    pub x: i64,
    pub y: i64,
}

impl PixelCoordinate {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl From<(i64, i64)> for PixelCoordinate {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

impl From<PixelCoordinate> for (i64, i64) {
    fn from(point: PixelCoordinate) -> Self {
        (point.x, point.y)
    }
}

impl fmt::Display for PixelCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// `{name}_{version}` identifier of the algorithm that produced a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmTag(String);

impl AlgorithmTag {
    pub fn new(name: &str, version: &str) -> Self {
        Self(format!("{}_{}", name, version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlgorithmTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join key shared by every stage's output: `(x, y, algorithm, date)`.
///
/// `date` is the acquisition window string for inputs and change detection,
/// and the query date for derived products.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub x: i64,
    pub y: i64,
    pub algorithm: AlgorithmTag,
    pub date: String,
}

impl RecordKey {
    pub fn new(
        coordinate: PixelCoordinate,
        algorithm: AlgorithmTag,
        date: impl Into<String>,
    ) -> Self {
        Self {
            x: coordinate.x,
            y: coordinate.y,
            algorithm,
            date: date.into(),
        }
    }

    pub fn coordinate(&self) -> PixelCoordinate {
        PixelCoordinate::new(self.x, self.y)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x, self.y, self.algorithm, self.date)
    }
}

// ============================================================================
// Errors carried inside records
// ============================================================================

/// Failure materialised as data inside a [`StageRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    /// Failure recorded by an earlier stage, carried forward with provenance.
    #[error("previous-error[{origin}]:{cause}")]
    Upstream { origin: String, cause: String },

    /// Fault raised by the current stage's own logic.
    #[error("{stage}:{message}")]
    Execution { stage: String, message: String },
}

impl StageError {
    pub fn upstream(origin: impl Into<String>, cause: &StageError) -> Self {
        StageError::Upstream {
            origin: origin.into(),
            cause: cause.to_string(),
        }
    }

    pub fn execution(stage: &AlgorithmTag, message: impl Into<String>) -> Self {
        StageError::Execution {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, StageError::Upstream { .. })
    }
}

// ============================================================================
// Stage records
// ============================================================================

/// Output of one stage for one key: either a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "StageRecordRepr<T>",
    try_from = "StageRecordRepr<T>",
    bound(serialize = "T: Serialize + Clone", deserialize = "T: Deserialize<'de>")
)]
pub struct StageRecord<T> {
    key: RecordKey,
    outcome: Result<T, StageError>,
}

impl<T> StageRecord<T> {
    pub fn ok(key: RecordKey, result: T) -> Self {
        Self {
            key,
            outcome: Ok(result),
        }
    }

    pub fn failed(key: RecordKey, error: StageError) -> Self {
        Self {
            key,
            outcome: Err(error),
        }
    }

    pub fn from_outcome(key: RecordKey, outcome: Result<T, StageError>) -> Self {
        Self { key, outcome }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn coordinate(&self) -> PixelCoordinate {
        self.key.coordinate()
    }

    pub fn result(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&StageError> {
        self.outcome.as_ref().err()
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn map_result<U>(self, f: impl FnOnce(T) -> U) -> StageRecord<U> {
        StageRecord {
            key: self.key,
            outcome: self.outcome.map(f),
        }
    }
}

/// Flat wire shape `{key, result, error}`.
#[derive(Serialize, Deserialize)]
struct StageRecordRepr<T> {
    key: RecordKey,
    result: Option<T>,
    error: Option<StageError>,
}

impl<T> From<StageRecord<T>> for StageRecordRepr<T> {
    fn from(record: StageRecord<T>) -> Self {
        match record.outcome {
            Ok(result) => Self {
                key: record.key,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                key: record.key,
                result: None,
                error: Some(error),
            },
        }
    }
}

impl<T> TryFrom<StageRecordRepr<T>> for StageRecord<T> {
    type Error = String;

    fn try_from(repr: StageRecordRepr<T>) -> Result<Self, Self::Error> {
        match (repr.result, repr.error) {
            (Some(result), None) => Ok(StageRecord::ok(repr.key, result)),
            (None, Some(error)) => Ok(StageRecord::failed(repr.key, error)),
            (Some(_), Some(_)) => Err(format!(
                "record {} carries both a result and an error",
                repr.key
            )),
            (None, None) => Err(format!(
                "record {} carries neither a result nor an error",
                repr.key
            )),
        }
    }
}

// ============================================================================
// Clip boxes
// ============================================================================

/// Rectangular clip region in projection coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ulx: f64,
    pub uly: f64,
    pub lrx: f64,
    pub lry: f64,
}

impl BoundingBox {
    pub fn new(ulx: f64, uly: f64, lrx: f64, lry: f64) -> Self {
        Self { ulx, uly, lrx, lry }
    }

    /// Whether both edge pairs are ordered (`ulx <= lrx`, `lry <= uly`).
    pub fn is_well_formed(&self) -> bool {
        self.ulx <= self.lrx && self.lry <= self.uly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RecordKey {
        RecordKey::new(
            PixelCoordinate::new(-1821585, 2891595),
            AlgorithmTag::new("lastchange", "v1"),
            "2014-12-12",
        )
    }

    #[test]
    fn algorithm_tag_joins_name_and_version() {
        assert_eq!(AlgorithmTag::new("ccd", "1.4.0").as_str(), "ccd_1.4.0");
    }

    #[test]
    fn upstream_error_renders_provenance() {
        let cause = StageError::Execution {
            stage: "ccd_1.4.0".to_string(),
            message: "too few observations".to_string(),
        };
        let err = StageError::upstream("ccd", &cause);
        assert_eq!(
            err.to_string(),
            "previous-error[ccd]:ccd_1.4.0:too few observations"
        );
        assert!(err.is_upstream());
    }

    #[test]
    fn record_exposes_exactly_one_side() {
        let ok = StageRecord::ok(key(), 735_000_i64);
        assert_eq!(ok.result(), Some(&735_000));
        assert!(ok.error().is_none());

        let failed: StageRecord<i64> = StageRecord::failed(
            key(),
            StageError::execution(&AlgorithmTag::new("curveqa", "v1"), "no segment"),
        );
        assert!(failed.result().is_none());
        assert_eq!(failed.error().unwrap().to_string(), "curveqa_v1:no segment");
        assert_eq!(failed.coordinate(), PixelCoordinate::new(-1821585, 2891595));
    }

    #[test]
    fn record_serializes_flat_triple() {
        let record = StageRecord::ok(key(), 3_i32);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["result"], 3);
        assert!(json["error"].is_null());
        assert_eq!(json["key"]["algorithm"], "lastchange_v1");

        let back: StageRecord<i32> = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn record_rejects_both_or_neither() {
        let both = serde_json::json!({
            "key": serde_json::to_value(key()).unwrap(),
            "result": 1,
            "error": {"kind": "execution", "stage": "s", "message": "m"},
        });
        assert!(serde_json::from_value::<StageRecord<i32>>(both).is_err());

        let neither = serde_json::json!({
            "key": serde_json::to_value(key()).unwrap(),
            "result": null,
            "error": null,
        });
        assert!(serde_json::from_value::<StageRecord<i32>>(neither).is_err());
    }

    #[test]
    fn bounding_box_well_formed() {
        assert!(BoundingBox::new(0.0, 10.0, 10.0, 0.0).is_well_formed());
        assert!(!BoundingBox::new(10.0, 10.0, 0.0, 0.0).is_well_formed());
    }
}
