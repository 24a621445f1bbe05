//! Shared data model for the land change product pipeline.
//!
//! Every stage of the product graph emits [`StageRecord`]s keyed by
//! [`RecordKey`] `(x, y, algorithm, date)`. A record holds either a result or a
//! [`StageError`], so failures travel through the graph as data and stay
//! attributable to the pixel that produced them.

pub mod dates;
pub mod defaults;
pub mod product;
pub mod series;
pub mod types;

pub use dates::{from_ordinal, to_ordinal, AcquisitionWindow, DateError};
pub use product::{ProductLabel, ProductValue};
pub use series::{BandMagnitudes, ChangeModel, ChangeModelSet, TimeSeriesError, TimeSeriesRecord};
pub use types::{AlgorithmTag, BoundingBox, PixelCoordinate, RecordKey, StageError, StageRecord};
