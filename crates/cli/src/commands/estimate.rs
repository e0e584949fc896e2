use sitequote_core::config::AppConfig;
use sitequote_core::estimate::{compute_estimate, EstimateInput};
use sitequote_core::workflow::nodes::render_estimate;

use super::CommandResult;

#[derive(Debug, Clone)]
pub struct EstimateArgs {
    pub service: String,
    pub square_footage: f64,
    pub location: String,
    pub material: String,
    pub timeline: String,
    pub json: bool,
}

/// One-shot estimate from fully specified inputs; the same calculator the
/// conversational flow uses, without a session.
pub fn run(config: &AppConfig, args: EstimateArgs) -> CommandResult {
    let service_type = args.service.trim().to_ascii_lowercase();
    let Some(service) = config.service(&service_type) else {
        let known = config.services.keys().cloned().collect::<Vec<_>>().join(", ");
        return CommandResult::failure(
            "estimate",
            "unknown_service",
            format!("no service `{service_type}` is configured (known: {known})"),
            2,
        );
    };

    let input = EstimateInput {
        service_type: &service_type,
        square_footage: args.square_footage,
        location: &args.location,
        material_type: &args.material,
        timeline: &args.timeline,
        image_refs: &[],
    };

    match compute_estimate(&input, service) {
        Ok(estimate) => {
            if args.json {
                match serde_json::to_string_pretty(&estimate) {
                    Ok(output) => CommandResult::ok(output),
                    Err(error) => {
                        CommandResult::failure("estimate", "serialization", error.to_string(), 1)
                    }
                }
            } else {
                CommandResult::ok(render_estimate(&estimate))
            }
        }
        Err(error) => CommandResult::failure(
            "estimate",
            "validation",
            format!("invalid value for `{}`: {error}", error.field()),
            2,
        ),
    }
}
