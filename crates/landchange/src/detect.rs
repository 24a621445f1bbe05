//! Change detection invocation.
//!
//! The curve fit itself is opaque: a [`ChangeDetector`] turns one pixel's time
//! series into a [`ChangeModelSet`] or fails. This module wraps that call in
//! the stage guards so a rejected series becomes an error record for its
//! pixel only.

use crate::guard::{guarded, Stage};
use anyhow::{anyhow, Context as _};
use landchange_protocol::{ChangeModelSet, StageRecord, TimeSeriesRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Parameters shared read-only by every detection call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionParams(Map<String, Value>);

impl DetectionParams {
    pub fn new(params: Map<String, Value>) -> Self {
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for DetectionParams {
    fn from(params: Map<String, Value>) -> Self {
        Self(params)
    }
}

/// The curve-fitting change detection algorithm.
///
/// Implementations must be deterministic: the same series and parameters
/// always produce the same models.
pub trait ChangeDetector: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn detect(&self, series: &TimeSeriesRecord, params: &DetectionParams) -> anyhow::Result<ChangeModelSet>;
}

/// Stage identity of a detector; its tag keys every `ccd` record.
pub fn detection_stage(detector: &dyn ChangeDetector) -> Stage {
    Stage::new(detector.name(), detector.version())
}

/// Guarded detection stage: staged inputs in, change models out.
///
/// Records keep the input's coordinate and acquisition window; only the
/// algorithm tag changes. `origin` names the inputs collection for
/// forwarded errors.
pub fn change_detection(
    detector: Arc<dyn ChangeDetector>,
    params: Arc<DetectionParams>,
    origin: impl Into<String>,
) -> impl Fn(StageRecord<TimeSeriesRecord>) -> StageRecord<ChangeModelSet> + Send + Sync + 'static {
    let stage = detection_stage(detector.as_ref());
    guarded(stage, origin, move |input: StageRecord<TimeSeriesRecord>| {
        let series = input
            .result()
            .ok_or_else(|| anyhow!("record {} has no time series", input.key()))?;
        series.validate().context("rejected time series")?;
        detector.detect(series, &params)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::ensure;
    use landchange_protocol::{
        AlgorithmTag, BandMagnitudes, ChangeModel, PixelCoordinate, RecordKey, StageError,
    };

    const ACQUIRED: &str = "1982-01-01/2015-12-12";

    /// One segment spanning the whole series.
    struct SingleSegment;

    impl ChangeDetector for SingleSegment {
        fn name(&self) -> &str {
            "ccd"
        }

        fn version(&self) -> &str {
            "1.4.0"
        }

        fn detect(&self, series: &TimeSeriesRecord, params: &DetectionParams) -> anyhow::Result<ChangeModelSet> {
            let min_obs = params.get("min_obs").and_then(Value::as_u64).unwrap_or(1) as usize;
            ensure!(series.len() >= min_obs, "{} observations, need {}", series.len(), min_obs);
            Ok(ChangeModelSet::new(vec![ChangeModel {
                start_day: series.dates[0],
                end_day: series.dates[series.len() - 1],
                break_day: series.dates[series.len() - 1],
                observation_count: series.len() as u32,
                change_probability: 0.0,
                curve_qa: 8,
                magnitudes: BandMagnitudes::default(),
            }]))
        }
    }

    fn series(n: usize) -> TimeSeriesRecord {
        TimeSeriesRecord {
            dates: (0..n as i64).map(|i| 723_000 + i * 16).collect(),
            blues: vec![0.1; n],
            greens: vec![0.1; n],
            reds: vec![0.1; n],
            nirs: vec![0.3; n],
            swir1s: vec![0.2; n],
            swir2s: vec![0.2; n],
            thermals: vec![280.0; n],
            quality: vec![66; n],
        }
    }

    fn input(series: TimeSeriesRecord) -> StageRecord<TimeSeriesRecord> {
        StageRecord::ok(
            RecordKey::new(
                PixelCoordinate::new(-1821585, 2891595),
                AlgorithmTag::new("inputs", "v1"),
                ACQUIRED,
            ),
            series,
        )
    }

    fn params(min_obs: u64) -> Arc<DetectionParams> {
        let mut map = Map::new();
        map.insert("min_obs".to_string(), Value::from(min_obs));
        Arc::new(DetectionParams::new(map))
    }

    #[test]
    fn detection_keys_by_acquired() {
        let f = change_detection(Arc::new(SingleSegment), params(3), "inputs");
        let out = f(input(series(5)));
        assert_eq!(out.key().algorithm.as_str(), "ccd_1.4.0");
        assert_eq!(out.key().date, ACQUIRED);
        assert_eq!(out.result().map(ChangeModelSet::len), Some(1));
    }

    #[test]
    fn short_series_becomes_error_record() {
        let f = change_detection(Arc::new(SingleSegment), params(12), "inputs");
        let out = f(input(series(5)));
        match out.error() {
            Some(StageError::Execution { stage, message }) => {
                assert_eq!(stage, "ccd_1.4.0");
                assert!(message.contains("need 12"), "{}", message);
            }
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    #[test]
    fn ragged_series_is_rejected_before_detection() {
        let mut ragged = series(4);
        ragged.thermals.pop();
        let f = change_detection(Arc::new(SingleSegment), params(1), "inputs");
        let out = f(input(ragged));
        let err = out.error().unwrap().to_string();
        assert!(err.contains("rejected time series"), "{}", err);
        assert!(err.contains("thermals"), "{}", err);
    }

    #[test]
    fn params_deserialize_from_json_object() {
        let p: DetectionParams = serde_json::from_str(r#"{"QA_BITPACKED": true}"#).unwrap();
        assert_eq!(p.get("QA_BITPACKED"), Some(&Value::Bool(true)));
        assert!(DetectionParams::default().is_empty());
    }
}
