use serde_json::Value;

use sitequote_cli::commands::{config, estimate};
use sitequote_core::config::AppConfig;

fn estimate_args(json: bool) -> estimate::EstimateArgs {
    estimate::EstimateArgs {
        service: "roofing".to_string(),
        square_footage: 2000.0,
        location: "west".to_string(),
        material: "tile".to_string(),
        timeline: "standard".to_string(),
        json,
    }
}

#[test]
fn estimate_renders_a_breakdown_for_valid_inputs() {
    let result = estimate::run(&AppConfig::default(), estimate_args(false));

    assert_eq!(result.exit_code, 0);
    assert!(result.output.contains("Total estimate:      $15,250.00"), "{}", result.output);
    assert!(result.output.contains("$13,725.00 - $16,775.00"), "{}", result.output);
}

#[test]
fn estimate_emits_json_when_asked() {
    let result = estimate::run(&AppConfig::default(), estimate_args(true));

    assert_eq!(result.exit_code, 0);
    let payload: Value = serde_json::from_str(&result.output).expect("valid JSON payload");
    assert_eq!(payload["service_type"], "roofing");
    assert_eq!(payload["total"], "15250.0");
}

#[test]
fn estimate_rejects_an_unknown_service() {
    let mut args = estimate_args(false);
    args.service = "landscaping".to_string();
    let result = estimate::run(&AppConfig::default(), args);

    assert_eq!(result.exit_code, 2);
    let payload: Value = serde_json::from_str(&result.output).expect("valid JSON error report");
    assert_eq!(payload["command"], "estimate");
    assert_eq!(payload["error_class"], "unknown_service");
    assert!(
        payload["message"].as_str().is_some_and(|message| message.contains("roofing")),
        "known services should be listed: {}",
        result.output
    );
}

#[test]
fn estimate_reports_the_offending_field_on_bad_input() {
    let mut args = estimate_args(false);
    args.square_footage = -50.0;
    let result = estimate::run(&AppConfig::default(), args);

    assert_eq!(result.exit_code, 2);
    let payload: Value = serde_json::from_str(&result.output).expect("valid JSON error report");
    assert_eq!(payload["error_class"], "validation");
    assert!(
        payload["message"].as_str().is_some_and(|message| message.contains("square_footage")),
        "{}",
        result.output
    );
}

#[test]
fn config_lists_every_effective_field_with_a_source() {
    let output = config::run(&AppConfig::default());

    assert!(output.contains("workflow.execution_limit = 250"), "{output}");
    assert!(output.contains("logging.level = info"), "{output}");
    assert!(output.contains("services.roofing.permit_fee = 250"), "{output}");
    for line in output.lines().skip(1) {
        assert!(
            line.contains("(env:") || line.contains("(file:") || line.contains("(default)"),
            "line missing source attribution: {line}"
        );
    }
}
