//! Job configuration for the product graph.
//!
//! A [`JobConfig`] is plain data, loaded from TOML or built in code, and
//! validated once before any dataset is created. Fetch functions are not
//! configuration; they are injected through [`crate::graph::Collaborators`].

use crate::detect::DetectionParams;
use landchange_engine::EngineConfig;
use landchange_protocol::defaults::{
    DEFAULT_CHIPS_URL, DEFAULT_INITIAL_PARTITIONS, DEFAULT_PRODUCT_PARTITIONS, DEFAULT_SPECS_URL,
};
use landchange_protocol::{dates, AcquisitionWindow, BoundingBox, DateError, PixelCoordinate, ProductLabel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid 'acquired': {0}")]
    InvalidAcquired(#[source] DateError),

    #[error("'chip_ids' is empty")]
    NoChipIds,

    #[error("Chip id {0} is listed more than once")]
    DuplicateChipId(PixelCoordinate),

    #[error("'products' is empty")]
    NoProducts,

    #[error("'{field}' must be a positive integer")]
    ZeroPartitions { field: &'static str },

    #[error("Products [{products}] require at least one entry in 'product_dates'")]
    MissingProductDates { products: String },

    #[error("Invalid product date: {0}")]
    InvalidProductDate(#[source] DateError),

    #[error("Product date '{0}' is listed more than once")]
    DuplicateProductDate(String),

    #[error("Malformed clip box {bbox:?}: expected ulx <= lrx and lry <= uly")]
    MalformedClipBox { bbox: BoundingBox },

    #[error("Invalid {field} '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
}

fn default_initial_partitions() -> usize {
    DEFAULT_INITIAL_PARTITIONS
}

fn default_product_partitions() -> usize {
    DEFAULT_PRODUCT_PARTITIONS
}

fn default_specs_url() -> String {
    DEFAULT_SPECS_URL.to_string()
}

fn default_chips_url() -> String {
    DEFAULT_CHIPS_URL.to_string()
}

/// Everything the graph assembler needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Acquisition window, `YYYY-MM-DD/YYYY-MM-DD`.
    pub acquired: String,
    /// Chip coordinates to process.
    pub chip_ids: Vec<(i64, i64)>,
    pub products: Vec<ProductLabel>,
    /// Query dates for derived products, `YYYY-MM-DD`.
    #[serde(default)]
    pub product_dates: Vec<String>,
    #[serde(default)]
    pub clip_box: Option<BoundingBox>,
    #[serde(default = "default_initial_partitions")]
    pub initial_partitions: usize,
    #[serde(default = "default_product_partitions")]
    pub product_partitions: usize,
    #[serde(default = "default_specs_url")]
    pub specs_url: String,
    #[serde(default = "default_chips_url")]
    pub chips_url: String,
    /// Passed verbatim to every change detection call.
    #[serde(default)]
    pub detection_params: DetectionParams,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl JobConfig {
    /// Config producing `inputs` and `ccd` for `chip_ids`, with defaults elsewhere.
    pub fn new<I, P>(acquired: impl Into<String>, chip_ids: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PixelCoordinate>,
    {
        Self {
            acquired: acquired.into(),
            chip_ids: chip_ids
                .into_iter()
                .map(|p| {
                    let point: PixelCoordinate = p.into();
                    (point.x, point.y)
                })
                .collect(),
            products: vec![ProductLabel::Inputs, ProductLabel::Ccd],
            product_dates: Vec::new(),
            clip_box: None,
            initial_partitions: DEFAULT_INITIAL_PARTITIONS,
            product_partitions: DEFAULT_PRODUCT_PARTITIONS,
            specs_url: default_specs_url(),
            chips_url: default_chips_url(),
            detection_params: DetectionParams::default(),
            engine: EngineConfig::default(),
        }
    }

    pub fn with_products(mut self, products: impl IntoIterator<Item = ProductLabel>) -> Self {
        self.products = products.into_iter().collect();
        self
    }

    pub fn with_product_dates<S: Into<String>>(mut self, dates: impl IntoIterator<Item = S>) -> Self {
        self.product_dates = dates.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_clip_box(mut self, clip_box: Option<BoundingBox>) -> Self {
        self.clip_box = clip_box;
        self
    }

    pub fn with_partitions(mut self, initial: usize, product: usize) -> Self {
        self.initial_partitions = initial;
        self.product_partitions = product;
        self
    }

    pub fn with_urls(mut self, specs_url: impl Into<String>, chips_url: impl Into<String>) -> Self {
        self.specs_url = specs_url.into();
        self.chips_url = chips_url.into();
        self
    }

    pub fn with_detection_params(mut self, params: DetectionParams) -> Self {
        self.detection_params = params;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parsed acquisition window.
    pub fn window(&self) -> Result<AcquisitionWindow, ConfigError> {
        AcquisitionWindow::parse(&self.acquired).map_err(ConfigError::InvalidAcquired)
    }

    pub fn chip_coordinates(&self) -> Vec<PixelCoordinate> {
        self.chip_ids.iter().copied().map(PixelCoordinate::from).collect()
    }

    /// Requested products that are evaluated per query date.
    pub fn derived_products(&self) -> Vec<ProductLabel> {
        self.products
            .iter()
            .copied()
            .filter(ProductLabel::is_derived)
            .collect()
    }

    /// Records each derived product will hold when no chip is clipped and
    /// every chip stages exactly one pixel.
    pub fn join_cardinality(&self) -> usize {
        self.chip_ids.len() * self.product_dates.len()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window()?;

        if self.chip_ids.is_empty() {
            return Err(ConfigError::NoChipIds);
        }
        let mut chips = HashSet::new();
        for chip in self.chip_coordinates() {
            if !chips.insert(chip) {
                return Err(ConfigError::DuplicateChipId(chip));
            }
        }
        if self.products.is_empty() {
            return Err(ConfigError::NoProducts);
        }
        if self.initial_partitions == 0 {
            return Err(ConfigError::ZeroPartitions {
                field: "initial_partitions",
            });
        }
        if self.product_partitions == 0 {
            return Err(ConfigError::ZeroPartitions {
                field: "product_partitions",
            });
        }

        let derived = self.derived_products();
        if !derived.is_empty() && self.product_dates.is_empty() {
            return Err(ConfigError::MissingProductDates {
                products: derived
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let mut seen = HashSet::new();
        for date in &self.product_dates {
            dates::parse_date(date).map_err(ConfigError::InvalidProductDate)?;
            if !seen.insert(date.as_str()) {
                return Err(ConfigError::DuplicateProductDate(date.clone()));
            }
        }

        if let Some(bbox) = self.clip_box {
            if !bbox.is_well_formed() {
                return Err(ConfigError::MalformedClipBox { bbox });
            }
        }

        check_url("specs_url", &self.specs_url)?;
        check_url("chips_url", &self.chips_url)?;
        Ok(())
    }
}

/// Parse `value` as an absolute URL with a host.
pub(crate) fn check_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
