//! Product graph assembly.
//!
//! ```text
//! chip ids -> staged inputs -> clip -> repartition -> ccd (persisted)
//!                                                      |
//!                                  product dates ---- cartesian
//!                                                      |
//!               lastchange / changemag / changedate / seglength / curveqa
//! ```
//!
//! Building the graph computes nothing. Shared ancestors are computed once
//! per action; change detection is persisted so every derived product reads
//! the same cached models.

use crate::bbox::fits_in_box;
use crate::config::{ConfigError, JobConfig};
use crate::detect::{change_detection, detection_stage, ChangeDetector};
use crate::ids;
use crate::inputs::{spec_queries, stage_chip, ChipsSource, InputStager, SpecsSource, StagingContext};
use crate::products::{deriver, product_dates, product_stage};
use landchange_engine::{Context, Dataset};
use landchange_protocol::{ChangeModelSet, ProductLabel, ProductValue, StageRecord, TimeSeriesRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Injected fetch, staging and detection functions.
#[derive(Clone)]
pub struct Collaborators {
    pub specs: Arc<dyn SpecsSource>,
    pub chips: Arc<dyn ChipsSource>,
    pub stager: Arc<dyn InputStager>,
    pub detector: Arc<dyn ChangeDetector>,
}

/// Lazy output collections keyed by product label.
#[derive(Clone)]
pub struct ProductGraph {
    inputs: Dataset<StageRecord<TimeSeriesRecord>>,
    ccd: Dataset<StageRecord<ChangeModelSet>>,
    products: BTreeMap<ProductLabel, Dataset<StageRecord<ProductValue>>>,
}

impl ProductGraph {
    /// Output collection for `label`, if it was requested.
    pub fn get(&self, label: ProductLabel) -> Option<&Dataset<StageRecord<ProductValue>>> {
        self.products.get(&label)
    }

    pub fn labels(&self) -> impl Iterator<Item = ProductLabel> + '_ {
        self.products.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Typed staged inputs, whether or not `inputs` was requested.
    pub fn inputs(&self) -> &Dataset<StageRecord<TimeSeriesRecord>> {
        &self.inputs
    }

    /// Typed, persisted change detection, whether or not `ccd` was requested.
    pub fn ccd(&self) -> &Dataset<StageRecord<ChangeModelSet>> {
        &self.ccd
    }

    pub fn into_products(self) -> BTreeMap<ProductLabel, Dataset<StageRecord<ProductValue>>> {
        self.products
    }
}

/// Build the lazy product graph for `config`.
///
/// Configuration is validated first; a [`ConfigError`] is the only failure
/// surfaced here. Per-record failures show up later as error records.
pub fn products(
    ctx: &Context,
    config: &JobConfig,
    collaborators: &Collaborators,
) -> Result<ProductGraph, ConfigError> {
    config.validate()?;
    let acquired = config.window()?;
    let staging = Arc::new(StagingContext {
        specs: collaborators.specs.clone(),
        chips: collaborators.chips.clone(),
        specs_url: config.specs_url.clone(),
        chips_url: config.chips_url.clone(),
        queries: spec_queries(&config.specs_url)?,
        acquired,
    });

    info!(
        chips = config.chip_ids.len(),
        dates = config.product_dates.len(),
        acquired = %config.acquired,
        "Building product graph for [{}]",
        config
            .products
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let chip_ids = ids::generate(ctx, config.chip_coordinates(), config.initial_partitions);

    let stager = collaborators.stager.clone();
    let clip_box = config.clip_box;
    let inputs = chip_ids
        .flat_map(move |chip| stage_chip(stager.as_ref(), chip, &staging))
        .filter(move |record| fits_in_box(&record.coordinate(), clip_box.as_ref()))
        .repartition(config.product_partitions)
        .with_name("inputs");

    let ccd_tag = detection_stage(collaborators.detector.as_ref()).tag();
    let ccd = inputs
        .map(change_detection(
            collaborators.detector.clone(),
            Arc::new(config.detection_params.clone()),
            inputs.name(),
        ))
        .with_name(ccd_tag.as_str())
        .persist();

    let mut joined = None;
    let mut products = BTreeMap::new();
    for &label in &config.products {
        if products.contains_key(&label) {
            continue;
        }
        let dataset = match label {
            ProductLabel::Inputs => inputs
                .map(|r| r.map_result(ProductValue::Inputs))
                .with_name("inputs"),
            ProductLabel::Ccd => ccd
                .map(|r| r.map_result(ProductValue::ChangeModels))
                .with_name(ccd_tag.as_str()),
            derived => {
                let joined = joined.get_or_insert_with(|| {
                    let dates = ctx
                        .parallelize(config.product_dates.clone(), 1)
                        .with_name("query dates");
                    product_dates(&ccd, &dates)
                });
                joined
                    .map(deriver(derived, ccd.name()))
                    .with_name(product_stage(derived).tag().as_str())
            }
        };
        products.insert(label, dataset);
    }

    Ok(ProductGraph {
        inputs,
        ccd,
        products,
    })
}
