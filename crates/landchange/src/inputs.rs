//! Input staging: chip ids in, per-pixel time series out.
//!
//! Fetching chip specs and raster chips and decoding them into pixel series
//! happens behind the [`SpecsSource`], [`ChipsSource`] and [`InputStager`]
//! traits. This module owns the spec queries, the staging context, and the
//! stage that turns a stager's output (or failure) into records.

use crate::config::{check_url, ConfigError};
use crate::guard::Stage;
use landchange_engine::panic_message;
use landchange_protocol::defaults::INPUTS_VERSION;
use landchange_protocol::{
    AcquisitionWindow, PixelCoordinate, RecordKey, StageError, StageRecord, TimeSeriesRecord,
};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Opaque chip specification payload.
pub type ChipSpec = serde_json::Value;

/// Opaque raster chip payload.
pub type Chip = serde_json::Value;

/// Band name and spec tag query, in the order bands are stacked.
pub const SPEC_QUERIES: [(&str, &str); 8] = [
    ("blues", "tags:blue AND sr"),
    ("greens", "tags:green AND sr"),
    ("reds", "tags:red AND sr"),
    ("nirs", "tags:nir AND sr"),
    ("swir1s", "tags:swir1 AND sr"),
    ("swir2s", "tags:swir2 AND sr"),
    ("thermals", "tags:thermal AND toa -BTB"),
    ("quality", "tags:pixelqa"),
];

/// Fetches chip specifications for a spec query URL.
pub trait SpecsSource: Send + Sync {
    fn fetch_specs(&self, query_url: &str) -> anyhow::Result<Vec<ChipSpec>>;
}

/// Fetches raster chips for one chip coordinate and acquisition window.
pub trait ChipsSource: Send + Sync {
    fn fetch_chips(
        &self,
        chips_url: &str,
        chip: PixelCoordinate,
        acquired: &AcquisitionWindow,
        ubids: &[String],
    ) -> anyhow::Result<Vec<Chip>>;
}

/// Assembles the per-pixel time series of one chip.
///
/// May return any number of pixels, including none.
pub trait InputStager: Send + Sync {
    fn stage(
        &self,
        chip: PixelCoordinate,
        ctx: &StagingContext,
    ) -> anyhow::Result<Vec<(PixelCoordinate, TimeSeriesRecord)>>;
}

/// Read-only inputs shared by every staging call.
#[derive(Clone)]
pub struct StagingContext {
    pub specs: Arc<dyn SpecsSource>,
    pub chips: Arc<dyn ChipsSource>,
    pub specs_url: String,
    pub chips_url: String,
    pub acquired: AcquisitionWindow,
    /// Band name to spec query URL, see [`spec_queries`].
    pub queries: BTreeMap<String, String>,
}

impl std::fmt::Debug for StagingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingContext")
            .field("specs_url", &self.specs_url)
            .field("chips_url", &self.chips_url)
            .field("acquired", &self.acquired)
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

/// Per-band spec query URLs for `specs_url`.
///
/// Each value is `specs_url` with a `q` parameter holding the band's tag
/// query.
pub fn spec_queries(specs_url: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let base = check_url("specs_url", specs_url)?;
    Ok(SPEC_QUERIES
        .iter()
        .map(|(band, query)| {
            let mut url = base.clone();
            url.query_pairs_mut().append_pair("q", query);
            (band.to_string(), url.to_string())
        })
        .collect())
}

/// Stage identity of staged inputs.
pub fn inputs_stage() -> Stage {
    Stage::new("inputs", INPUTS_VERSION)
}

/// Stage one chip into records keyed `(x, y, inputs_<version>, acquired)`.
///
/// A stager error or panic yields a single error record keyed by the chip
/// coordinate. A pixel whose series is ragged or empty yields an error record
/// for that pixel.
pub fn stage_chip(
    stager: &dyn InputStager,
    chip: PixelCoordinate,
    ctx: &StagingContext,
) -> Vec<StageRecord<TimeSeriesRecord>> {
    let tag = inputs_stage().tag();
    let acquired = ctx.acquired.as_str();

    let staged = match catch_unwind(AssertUnwindSafe(|| stager.stage(chip, ctx))) {
        Ok(Ok(pixels)) => pixels,
        Ok(Err(err)) => {
            return vec![chip_failure(chip, &tag, acquired, format!("{:#}", err))];
        }
        Err(payload) => {
            let message = format!("panicked: {}", panic_message(payload.as_ref()));
            return vec![chip_failure(chip, &tag, acquired, message)];
        }
    };

    debug!(x = chip.x, y = chip.y, pixels = staged.len(), "Staged chip");
    staged
        .into_iter()
        .map(|(pixel, series)| {
            let key = RecordKey::new(pixel, tag.clone(), acquired);
            match series.validate() {
                Ok(()) => StageRecord::ok(key, series),
                Err(err) => StageRecord::failed(key, StageError::execution(&tag, err.to_string())),
            }
        })
        .collect()
}

fn chip_failure(
    chip: PixelCoordinate,
    tag: &landchange_protocol::AlgorithmTag,
    acquired: &str,
    message: String,
) -> StageRecord<TimeSeriesRecord> {
    warn!(x = chip.x, y = chip.y, stage = %tag, "Staging failed: {}", message);
    StageRecord::failed(
        RecordKey::new(chip, tag.clone(), acquired),
        StageError::execution(tag, message),
    )
}
