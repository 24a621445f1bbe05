//! Product derivation: change models evaluated at query dates.
//!
//! Design principles:
//! - Derivers are pure functions of `(ChangeModelSet, ordinal date)`
//! - The product-date join pairs every pixel with every query date; it is
//!   the only place the pipeline grows multiplicatively
//! - Each derived record is keyed `(x, y, <product>_<version>, query date)`

use crate::guard::{guarded, GuardedInput, Stage};
use anyhow::{anyhow, bail, ensure, Result};
use landchange_engine::Dataset;
use landchange_protocol::defaults::PRODUCT_VERSION;
use landchange_protocol::{
    dates, AcquisitionWindow, ChangeModel, ChangeModelSet, PixelCoordinate, ProductLabel,
    ProductValue, StageError, StageRecord,
};

// ============================================================================
// Product-date join
// ============================================================================

/// One change detection record paired with one query date.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductInput {
    pub ccd: StageRecord<ChangeModelSet>,
    /// Query date, `YYYY-MM-DD`.
    pub query_date: String,
}

impl From<(StageRecord<ChangeModelSet>, String)> for ProductInput {
    fn from((ccd, query_date): (StageRecord<ChangeModelSet>, String)) -> Self {
        Self { ccd, query_date }
    }
}

impl GuardedInput for ProductInput {
    fn coordinate(&self) -> PixelCoordinate {
        self.ccd.coordinate()
    }

    fn output_date(&self) -> String {
        self.query_date.clone()
    }

    fn prior_error(&self) -> Option<&StageError> {
        self.ccd.error()
    }
}

/// Pair every change detection record with every query date.
///
/// Cost is multiplicative: the result holds `|pixels| x |dates|` records in
/// `ccd.num_partitions() x dates.num_partitions()` partitions, and every
/// deriver runs once per record. A million pixels at ten dates is ten million
/// evaluations per derived product.
pub fn product_dates(
    ccd: &Dataset<StageRecord<ChangeModelSet>>,
    dates: &Dataset<String>,
) -> Dataset<ProductInput> {
    ccd.cartesian(dates)
        .map(ProductInput::from)
        .with_name("product dates")
}

// ============================================================================
// Derivers
// ============================================================================

fn check_ordinal(ord_date: i64) -> Result<()> {
    ensure!(ord_date > 0, "ordinal date {} is not positive", ord_date);
    Ok(())
}

/// Breaking model with the greatest break day at or before `ord_date`.
fn latest_break(models: &ChangeModelSet, ord_date: i64) -> Option<&ChangeModel> {
    models
        .iter()
        .filter(|m| m.has_break() && m.break_day <= ord_date)
        .max_by_key(|m| m.break_day)
}

/// Ordinal day of the most recent break at or before `ord_date`, 0 if none.
pub fn lastchange(models: &ChangeModelSet, ord_date: i64) -> Result<i64> {
    check_ordinal(ord_date)?;
    Ok(latest_break(models, ord_date).map_or(0, |m| m.break_day))
}

/// Spectral magnitude of the most recent break, 0.0 if none.
///
/// Euclidean norm of the green, red, nir, swir1 and swir2 magnitudes.
pub fn changemag(models: &ChangeModelSet, ord_date: i64) -> Result<f64> {
    check_ordinal(ord_date)?;
    Ok(latest_break(models, ord_date).map_or(0.0, |m| {
        let b = &m.magnitudes;
        [b.green, b.red, b.nir, b.swir1, b.swir2]
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }))
}

/// Same value as [`lastchange`], published under its own label.
pub fn changedate(models: &ChangeModelSet, ord_date: i64) -> Result<i64> {
    lastchange(models, ord_date)
}

/// Days from the latest segment boundary before `ord_date` to `ord_date`.
///
/// Boundaries earlier than `window_start` are replaced by it, so a segment
/// never reports length from before the acquisition window.
pub fn seglength(models: &ChangeModelSet, ord_date: i64, window_start: i64) -> Result<i64> {
    check_ordinal(ord_date)?;
    ensure!(
        ord_date > window_start,
        "query date {} is not after acquisition start {}",
        ord_date,
        window_start
    );
    let boundary = models
        .iter()
        .flat_map(|m| [m.start_day, m.end_day])
        .filter(|day| *day < ord_date)
        .fold(window_start, i64::max);
    Ok(ord_date - boundary)
}

/// Curve fit quality of the segment covering `ord_date`.
pub fn curveqa(models: &ChangeModelSet, ord_date: i64) -> Result<i32> {
    check_ordinal(ord_date)?;
    models
        .iter()
        .find(|m| m.covers(ord_date))
        .map(|m| m.curve_qa)
        .ok_or_else(|| anyhow!("no segment covers ordinal date {}", ord_date))
}

// ============================================================================
// Guarded stages
// ============================================================================

/// Stage identity of a derived product.
pub fn product_stage(label: ProductLabel) -> Stage {
    Stage::new(label.as_str(), PRODUCT_VERSION)
}

/// Evaluate `label` for one joined record.
pub fn evaluate(label: ProductLabel, input: &ProductInput) -> Result<ProductValue> {
    let models = input
        .ccd
        .result()
        .ok_or_else(|| anyhow!("record {} has no change models", input.ccd.key()))?;
    let ord_date = dates::to_ordinal(&input.query_date)?;

    let value = match label {
        ProductLabel::LastChange => ProductValue::LastChange(lastchange(models, ord_date)?),
        ProductLabel::ChangeMag => ProductValue::ChangeMagnitude(changemag(models, ord_date)?),
        ProductLabel::ChangeDate => ProductValue::ChangeDate(changedate(models, ord_date)?),
        ProductLabel::SegLength => {
            let window = AcquisitionWindow::parse(&input.ccd.key().date)?;
            ProductValue::SegmentLength(seglength(models, ord_date, window.start_ordinal())?)
        }
        ProductLabel::CurveQa => ProductValue::CurveQa(curveqa(models, ord_date)?),
        ProductLabel::Inputs | ProductLabel::Ccd => bail!("{} is not a derived product", label),
    };
    Ok(value)
}

/// Guarded deriver for `label`; `origin` names the change detection
/// collection for forwarded errors.
pub fn deriver(
    label: ProductLabel,
    origin: impl Into<String>,
) -> impl Fn(ProductInput) -> StageRecord<ProductValue> + Send + Sync + 'static {
    guarded(product_stage(label), origin, move |input: ProductInput| {
        evaluate(label, &input)
    })
}
