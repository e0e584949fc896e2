use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ImageRef;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: Decimal,
    pub high: Decimal,
}

/// Deterministic output of the estimation calculator. Inputs are echoed so a
/// rendered estimate is self-describing without re-reading conversation state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateResult {
    pub service_type: String,
    pub square_footage: f64,
    pub location: String,
    pub material_type: String,
    pub timeline: String,
    pub base_cost: Decimal,
    pub material_cost: Decimal,
    pub region_adjustment: Decimal,
    pub timeline_adjustment: Decimal,
    pub permit_fee: Decimal,
    pub total: Decimal,
    pub price_range: PriceRange,
    pub image_refs: Vec<ImageRef>,
}

impl EstimateResult {
    /// Sum of the individual cost components. Equals `total` unless the
    /// configured minimum display floor engaged.
    pub fn component_sum(&self) -> Decimal {
        self.base_cost
            + self.material_cost
            + self.region_adjustment
            + self.timeline_adjustment
            + self.permit_fee
    }
}
