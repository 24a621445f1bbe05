//! Land surface change detection products.
//!
//! For every pixel of the requested chips, staged reflectance time series are
//! run through a change detection algorithm, and the resulting change models
//! are evaluated at query dates to produce `lastchange`, `changemag`,
//! `changedate`, `seglength` and `curveqa`.
//!
//! # Failure model
//!
//! Only configuration errors fail [`graph::products`]. Anything that goes
//! wrong for one pixel (staging, detection, derivation) becomes an error
//! record for that pixel, and every later stage forwards it with provenance
//! instead of running. Error records are never dropped.
//!
//! # Modules
//!
//! - [`ids`]: chip ids as a dataset, and their Arrow table projection
//! - [`bbox`]: clip box filter
//! - [`guard`]: upstream short-circuit and fault capture combinators
//! - [`inputs`]: staging collaborators and spec queries
//! - [`detect`]: change detection invocation
//! - [`products`]: product-date join and derivers
//! - [`graph`]: graph assembly
//! - [`config`]: job configuration

pub mod bbox;
pub mod config;
pub mod detect;
pub mod graph;
pub mod guard;
pub mod ids;
pub mod inputs;
pub mod products;

pub use bbox::{fits_in_box, minbox};
pub use config::{ConfigError, JobConfig};
pub use detect::{ChangeDetector, DetectionParams};
pub use graph::{products, Collaborators, ProductGraph};
pub use guard::{capture_fault, guarded, short_circuit_on_upstream_error, GuardedInput, Stage};
pub use ids::{chip_schema, generate, tile_schema, to_table, IdRow, SchemaError};
pub use inputs::{spec_queries, Chip, ChipSpec, ChipsSource, InputStager, SpecsSource, StagingContext};
pub use products::{product_dates, ProductInput};
