//! Product labels and the values each product carries.

use crate::series::{ChangeModelSet, TimeSeriesRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label of an output collection in the product graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductLabel {
    Inputs,
    Ccd,
    LastChange,
    ChangeMag,
    ChangeDate,
    SegLength,
    CurveQa,
}

impl ProductLabel {
    pub const ALL: [ProductLabel; 7] = [
        ProductLabel::Inputs,
        ProductLabel::Ccd,
        ProductLabel::LastChange,
        ProductLabel::ChangeMag,
        ProductLabel::ChangeDate,
        ProductLabel::SegLength,
        ProductLabel::CurveQa,
    ];

    /// Products evaluated against query dates.
    pub const DERIVED: [ProductLabel; 5] = [
        ProductLabel::LastChange,
        ProductLabel::ChangeMag,
        ProductLabel::ChangeDate,
        ProductLabel::SegLength,
        ProductLabel::CurveQa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductLabel::Inputs => "inputs",
            ProductLabel::Ccd => "ccd",
            ProductLabel::LastChange => "lastchange",
            ProductLabel::ChangeMag => "changemag",
            ProductLabel::ChangeDate => "changedate",
            ProductLabel::SegLength => "seglength",
            ProductLabel::CurveQa => "curveqa",
        }
    }

    pub fn is_derived(&self) -> bool {
        Self::DERIVED.contains(self)
    }
}

impl fmt::Display for ProductLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == lowered)
            .ok_or_else(|| {
                format!(
                    "Invalid product: '{}'. Expected one of: {}",
                    s,
                    Self::ALL.map(|l| l.as_str()).join(", ")
                )
            })
    }
}

/// Result payload of any stage in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "product", content = "value", rename_all = "lowercase")]
pub enum ProductValue {
    Inputs(TimeSeriesRecord),
    #[serde(rename = "ccd")]
    ChangeModels(ChangeModelSet),
    /// Ordinal day of the most recent break.
    LastChange(i64),
    #[serde(rename = "changemag")]
    ChangeMagnitude(f64),
    /// Ordinal day of the most recent break.
    ChangeDate(i64),
    /// Days since the latest segment boundary.
    #[serde(rename = "seglength")]
    SegmentLength(i64),
    CurveQa(i32),
}
