//! Landchange Test Utilities
//!
//! In-memory stand-ins for the collaborators the product graph consumes:
//!
//! - [`MockSpecs`] / [`MockChips`]: fetch functions returning synthetic JSON
//! - [`MockStager`]: stages pixels per chip through the mock sources
//! - [`CountingDetector`] / [`FailingDetector`]: change detectors that count
//!   calls or always fail
//! - [`series_fixture`] / [`models_fixture`]: deterministic data
//!
//! # Usage
//!
//! ```rust,ignore
//! use landchange_test_utils::collaborators;
//!
//! let (collab, detector) = collaborators();
//! let graph = landchange::products(&ctx, &config, &collab)?;
//! graph.get(ProductLabel::LastChange).unwrap().count()?;
//! assert_eq!(detector.calls(), 1);
//! ```

use anyhow::{bail, ensure, Context as _};
use landchange::detect::{ChangeDetector, DetectionParams};
use landchange::graph::Collaborators;
use landchange::inputs::{Chip, ChipSpec, ChipsSource, InputStager, SpecsSource, StagingContext};
use landchange_protocol::{
    AcquisitionWindow, BandMagnitudes, ChangeModel, ChangeModelSet, PixelCoordinate,
    TimeSeriesRecord,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Days between synthetic observations.
pub const OBSERVATION_INTERVAL: i64 = 16;

/// Fewest observations [`CountingDetector`] accepts.
pub const MIN_OBSERVATIONS: usize = 12;

/// Pixel spacing within a chip, in projection units.
pub const PIXEL_SIZE: i64 = 30;

// ============================================================================
// Fixtures
// ============================================================================

/// Observations every [`OBSERVATION_INTERVAL`] days across `window`.
///
/// Band values depend only on `seed` and the observation index.
pub fn series_fixture(window: &AcquisitionWindow, seed: i64) -> TimeSeriesRecord {
    let dates: Vec<i64> = (window.start_ordinal()..=window.end_ordinal())
        .step_by(OBSERVATION_INTERVAL as usize)
        .collect();
    series_from_dates(dates, seed)
}

/// A series of `n` observations starting at `start`.
pub fn short_series(start: i64, n: usize, seed: i64) -> TimeSeriesRecord {
    let dates = (0..n as i64).map(|i| start + i * OBSERVATION_INTERVAL).collect();
    series_from_dates(dates, seed)
}

fn series_from_dates(dates: Vec<i64>, seed: i64) -> TimeSeriesRecord {
    let wave = |i: usize, base: f64| base + (((i as i64 + seed).rem_euclid(23)) as f64) * 0.001;
    let n = dates.len();
    TimeSeriesRecord {
        blues: (0..n).map(|i| wave(i, 0.05)).collect(),
        greens: (0..n).map(|i| wave(i, 0.08)).collect(),
        reds: (0..n).map(|i| wave(i, 0.07)).collect(),
        nirs: (0..n).map(|i| wave(i, 0.30)).collect(),
        swir1s: (0..n).map(|i| wave(i, 0.20)).collect(),
        swir2s: (0..n).map(|i| wave(i, 0.12)).collect(),
        thermals: (0..n).map(|i| wave(i, 290.0)).collect(),
        quality: vec![322; n],
        dates,
    }
}

/// Three segments over the series dates: two ending in breaks, one open.
///
/// Returns an empty set for series shorter than three observations.
pub fn models_fixture(series: &TimeSeriesRecord) -> ChangeModelSet {
    let n = series.len();
    if n < 3 {
        return ChangeModelSet::default();
    }
    let cuts = [(0, n / 3 - 1), (n / 3, 2 * n / 3 - 1), (2 * n / 3, n - 1)];
    let models = cuts
        .iter()
        .enumerate()
        .map(|(idx, &(first, last))| {
            let breaks = idx < 2;
            ChangeModel {
                start_day: series.dates[first],
                end_day: series.dates[last],
                break_day: series.dates[last],
                observation_count: (last - first + 1) as u32,
                change_probability: if breaks { 1.0 } else { 0.0 },
                curve_qa: 8 * (idx as i32 + 1),
                magnitudes: BandMagnitudes {
                    blue: 10.0 * idx as f64,
                    green: 3.0,
                    red: 4.0,
                    nir: 0.0,
                    swir1: 0.0,
                    swir2: 12.0,
                    thermal: 0.0,
                },
            }
        })
        .collect();
    ChangeModelSet::new(models)
}

// ============================================================================
// Sources
// ============================================================================

/// Returns one spec per query, with a ubid derived from the query URL.
#[derive(Debug, Default)]
pub struct MockSpecs {
    calls: AtomicUsize,
}

impl MockSpecs {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpecsSource for MockSpecs {
    fn fetch_specs(&self, query_url: &str) -> anyhow::Result<Vec<ChipSpec>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tag = query_url.rsplit("q=").next().unwrap_or(query_url);
        Ok(vec![json!({
            "ubid": format!("MOCK/{}", tag),
            "data_shape": [100, 100],
            "query": query_url,
        })])
    }
}

/// Returns one chip per requested ubid.
#[derive(Debug, Default)]
pub struct MockChips {
    calls: AtomicUsize,
}

impl MockChips {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChipsSource for MockChips {
    fn fetch_chips(
        &self,
        chips_url: &str,
        chip: PixelCoordinate,
        acquired: &AcquisitionWindow,
        ubids: &[String],
    ) -> anyhow::Result<Vec<Chip>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ubids
            .iter()
            .map(|ubid| {
                json!({
                    "x": chip.x,
                    "y": chip.y,
                    "acquired": acquired.as_str(),
                    "ubid": ubid,
                    "source": chips_url,
                })
            })
            .collect())
    }
}

// ============================================================================
// Stager
// ============================================================================

/// Stages synthetic pixels through the context's sources.
///
/// Each chip yields `pixels_per_chip` pixels spaced [`PIXEL_SIZE`] apart along
/// x, starting at the chip coordinate.
#[derive(Debug, Clone)]
pub struct MockStager {
    pixels_per_chip: usize,
    failing: HashSet<PixelCoordinate>,
    short: HashSet<PixelCoordinate>,
}

impl Default for MockStager {
    fn default() -> Self {
        Self {
            pixels_per_chip: 1,
            failing: HashSet::new(),
            short: HashSet::new(),
        }
    }
}

impl MockStager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pixels_per_chip(mut self, pixels: usize) -> Self {
        self.pixels_per_chip = pixels;
        self
    }

    /// Staging `chip` fails outright.
    pub fn failing_on(mut self, chip: impl Into<PixelCoordinate>) -> Self {
        self.failing.insert(chip.into());
        self
    }

    /// Pixels of `chip` get too few observations for detection.
    pub fn short_on(mut self, chip: impl Into<PixelCoordinate>) -> Self {
        self.short.insert(chip.into());
        self
    }
}

impl InputStager for MockStager {
    fn stage(
        &self,
        chip: PixelCoordinate,
        ctx: &StagingContext,
    ) -> anyhow::Result<Vec<(PixelCoordinate, TimeSeriesRecord)>> {
        if self.failing.contains(&chip) {
            bail!("chip source unavailable for {}", chip);
        }

        let mut ubids = Vec::with_capacity(ctx.queries.len());
        for (band, query) in &ctx.queries {
            let specs = ctx
                .specs
                .fetch_specs(query)
                .with_context(|| format!("fetching {} specs", band))?;
            for spec in specs {
                if let Some(ubid) = spec.get("ubid").and_then(|v| v.as_str()) {
                    ubids.push(ubid.to_string());
                }
            }
        }
        let chips = ctx
            .chips
            .fetch_chips(&ctx.chips_url, chip, &ctx.acquired, &ubids)?;
        ensure!(chips.len() == ubids.len(), "expected {} chips, got {}", ubids.len(), chips.len());

        Ok((0..self.pixels_per_chip as i64)
            .map(|i| {
                let pixel = PixelCoordinate::new(chip.x + i * PIXEL_SIZE, chip.y);
                let seed = pixel.x ^ pixel.y;
                let series = if self.short.contains(&chip) {
                    short_series(ctx.acquired.start_ordinal(), MIN_OBSERVATIONS - 1, seed)
                } else {
                    series_fixture(&ctx.acquired, seed)
                };
                (pixel, series)
            })
            .collect())
    }
}

// ============================================================================
// Detectors
// ============================================================================

/// Returns [`models_fixture`] and counts every call.
///
/// Series shorter than [`MIN_OBSERVATIONS`] are rejected.
#[derive(Debug, Default)]
pub struct CountingDetector {
    calls: AtomicUsize,
}

impl CountingDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChangeDetector for CountingDetector {
    fn name(&self) -> &str {
        "ccd"
    }

    fn version(&self) -> &str {
        "v1"
    }

    fn detect(&self, series: &TimeSeriesRecord, _params: &DetectionParams) -> anyhow::Result<ChangeModelSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ensure!(
            series.len() >= MIN_OBSERVATIONS,
            "{} observations, at least {} required",
            series.len(),
            MIN_OBSERVATIONS
        );
        Ok(models_fixture(series))
    }
}

/// Fails every call with `message`.
#[derive(Debug, Clone)]
pub struct FailingDetector {
    pub message: String,
}

impl FailingDetector {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ChangeDetector for FailingDetector {
    fn name(&self) -> &str {
        "ccd"
    }

    fn version(&self) -> &str {
        "v1"
    }

    fn detect(&self, _series: &TimeSeriesRecord, _params: &DetectionParams) -> anyhow::Result<ChangeModelSet> {
        bail!("{}", self.message)
    }
}

// ============================================================================
// Bundles
// ============================================================================

/// Mock sources, a default [`MockStager`] and a [`CountingDetector`].
pub fn collaborators() -> (Collaborators, Arc<CountingDetector>) {
    collaborators_with(MockStager::default())
}

/// Like [`collaborators`] with a custom stager.
pub fn collaborators_with(stager: MockStager) -> (Collaborators, Arc<CountingDetector>) {
    let detector = Arc::new(CountingDetector::new());
    let collab = Collaborators {
        specs: Arc::new(MockSpecs::default()),
        chips: Arc::new(MockChips::default()),
        stager: Arc::new(stager),
        detector: detector.clone(),
    };
    (collab, detector)
}
