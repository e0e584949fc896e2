use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::config::ServiceConfig;
use crate::domain::conversation::ImageRef;
use crate::domain::estimate::{EstimateResult, PriceRange};
use crate::errors::EstimateError;

/// Validated inputs for one estimate computation.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimateInput<'a> {
    pub service_type: &'a str,
    pub square_footage: f64,
    pub location: &'a str,
    pub material_type: &'a str,
    pub timeline: &'a str,
    pub image_refs: &'a [ImageRef],
}

/// Pure pricing calculator. Stateless, safe to call from any number of
/// concurrent sessions, and bit-identical for identical inputs.
///
/// Cost model: every multiplier applies to the base cost independently, so a
/// component line is `base * (multiplier - 1)` and the total is the plain sum
/// of components plus the permit fee.
pub fn compute_estimate(
    input: &EstimateInput<'_>,
    service: &ServiceConfig,
) -> Result<EstimateResult, EstimateError> {
    if !input.square_footage.is_finite() || input.square_footage <= 0.0 {
        return Err(EstimateError::validation("square_footage"));
    }
    let square_footage = Decimal::from_f64(input.square_footage)
        .ok_or_else(|| EstimateError::validation("square_footage"))?;

    let material = multiplier_for(&service.materials, input.material_type, "material_type")?;
    let region = multiplier_for(&service.regions, input.location, "location")?;
    let timeline = multiplier_for(&service.timelines, input.timeline, "timeline")?;

    let base_cost = service.base_rate_per_unit * square_footage;
    let material_cost = base_cost * (material - Decimal::ONE);
    let region_adjustment = base_cost * (region - Decimal::ONE);
    let timeline_adjustment = base_cost * (timeline - Decimal::ONE);

    let mut total =
        base_cost + material_cost + region_adjustment + timeline_adjustment + service.permit_fee;
    if total < service.minimum_total {
        total = service.minimum_total;
    }

    let price_range = PriceRange {
        low: total * (Decimal::ONE - service.price_range_pct),
        high: total * (Decimal::ONE + service.price_range_pct),
    };

    Ok(EstimateResult {
        service_type: input.service_type.to_string(),
        square_footage: input.square_footage,
        location: normalize(input.location),
        material_type: normalize(input.material_type),
        timeline: normalize(input.timeline),
        base_cost,
        material_cost,
        region_adjustment,
        timeline_adjustment,
        permit_fee: service.permit_fee,
        total,
        price_range,
        image_refs: input.image_refs.to_vec(),
    })
}

fn multiplier_for(
    table: &std::collections::BTreeMap<String, Decimal>,
    key: &str,
    field: &str,
) -> Result<Decimal, EstimateError> {
    table.get(&normalize(key)).copied().ok_or_else(|| EstimateError::validation(field))
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::config::AppConfig;
    use crate::errors::EstimateError;
    use crate::estimate::{compute_estimate, EstimateInput};

    fn roofing_input() -> EstimateInput<'static> {
        EstimateInput {
            service_type: "roofing",
            square_footage: 2000.0,
            location: "West",
            material_type: "tile",
            timeline: "standard",
            image_refs: &[],
        }
    }

    #[test]
    fn reference_roofing_estimate_matches_expected_breakdown() {
        let config = AppConfig::default();
        let service = config.service("roofing").expect("roofing configured");

        let estimate = compute_estimate(&roofing_input(), service).expect("estimate computes");

        assert_eq!(estimate.base_cost, Decimal::new(10_000, 0));
        assert_eq!(estimate.material_cost, Decimal::new(4_000, 0));
        assert_eq!(estimate.region_adjustment, Decimal::new(1_000, 0));
        assert_eq!(estimate.timeline_adjustment, Decimal::ZERO);
        assert_eq!(estimate.permit_fee, Decimal::new(250, 0));
        assert_eq!(estimate.total, Decimal::new(15_250, 0));
        assert_eq!(estimate.price_range.low, Decimal::new(13_725, 0));
        assert_eq!(estimate.price_range.high, Decimal::new(16_775, 0));
        assert_eq!(estimate.component_sum(), estimate.total);
    }

    #[test]
    fn recomputation_is_bit_identical() {
        let config = AppConfig::default();
        let service = config.service("roofing").expect("roofing configured");

        let first = compute_estimate(&roofing_input(), service).expect("first estimate");
        let second = compute_estimate(&roofing_input(), service).expect("second estimate");

        assert_eq!(first, second);
    }

    #[test]
    fn totals_never_fall_below_the_configured_floor() {
        let config = AppConfig::default();
        let mut service = config.service("roofing").expect("roofing configured").clone();
        service.minimum_total = Decimal::new(500, 0);

        let input = EstimateInput { square_footage: 10.0, ..roofing_input() };
        let estimate = compute_estimate(&input, &service).expect("estimate computes");

        // 10 sq ft at these rates comes out far under the floor.
        assert!(estimate.component_sum() < service.minimum_total);
        assert_eq!(estimate.total, service.minimum_total);
        assert!(estimate.price_range.low <= estimate.total);
        assert!(estimate.price_range.high >= estimate.total);
    }

    #[test]
    fn non_positive_and_non_finite_square_footage_are_rejected() {
        let config = AppConfig::default();
        let service = config.service("roofing").expect("roofing configured");

        for bad in [0.0, -25.0, f64::NAN, f64::INFINITY] {
            let input = EstimateInput { square_footage: bad, ..roofing_input() };
            let error = compute_estimate(&input, service).expect_err("must reject");
            assert_eq!(error, EstimateError::validation("square_footage"));
        }
    }

    #[test]
    fn unknown_lookup_keys_name_the_offending_field() {
        let config = AppConfig::default();
        let service = config.service("roofing").expect("roofing configured");

        let input = EstimateInput { material_type: "gold leaf", ..roofing_input() };
        let error = compute_estimate(&input, service).expect_err("unknown material");
        assert_eq!(error, EstimateError::validation("material_type"));

        let input = EstimateInput { location: "atlantis", ..roofing_input() };
        let error = compute_estimate(&input, service).expect_err("unknown region");
        assert_eq!(error, EstimateError::validation("location"));

        let input = EstimateInput { timeline: "yesterday", ..roofing_input() };
        let error = compute_estimate(&input, service).expect_err("unknown timeline");
        assert_eq!(error, EstimateError::validation("timeline"));
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let config = AppConfig::default();
        let service = config.service("roofing").expect("roofing configured");

        let input = EstimateInput {
            location: "WEST",
            material_type: "Tile",
            timeline: "Standard",
            ..roofing_input()
        };
        let estimate = compute_estimate(&input, service).expect("estimate computes");
        assert_eq!(estimate.location, "west");
        assert_eq!(estimate.total, Decimal::new(15_250, 0));
    }
}
