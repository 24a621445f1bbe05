//! Canonical default values shared across the pipeline crates.

pub const DEFAULT_SPECS_URL: &str = "http://localhost:5678/v1/landsat/chip-specs";
pub const DEFAULT_CHIPS_URL: &str = "http://localhost:5678/v1/landsat/chips";
pub const DEFAULT_INITIAL_PARTITIONS: usize = 1;
pub const DEFAULT_PRODUCT_PARTITIONS: usize = 1;

/// Version stamped onto every derived product's algorithm tag.
pub const PRODUCT_VERSION: &str = "v1";
/// Version stamped onto staged input records.
pub const INPUTS_VERSION: &str = "v1";
