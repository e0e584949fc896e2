use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sitequote_core::config::AppConfig;
use toml::Value;

/// Renders the effective configuration with per-field source attribution so
/// an operator can see where a surprising value came from.
pub fn run(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "workflow.execution_limit",
        &config.workflow.execution_limit.to_string(),
        field_source(
            "workflow.execution_limit",
            Some("SITEQUOTE_WORKFLOW_EXECUTION_LIMIT"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "workflow.extraction_timeout_secs",
        &config.workflow.extraction_timeout_secs.to_string(),
        field_source(
            "workflow.extraction_timeout_secs",
            Some("SITEQUOTE_WORKFLOW_EXTRACTION_TIMEOUT_SECS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "workflow.default_merge",
        &format!("{:?}", config.workflow.default_merge),
        field_source(
            "workflow.default_merge",
            Some("SITEQUOTE_WORKFLOW_DEFAULT_MERGE"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        field_source(
            "logging.level",
            Some("SITEQUOTE_LOGGING_LEVEL"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        field_source(
            "logging.format",
            Some("SITEQUOTE_LOGGING_FORMAT"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    for (name, service) in &config.services {
        let source = field_source(
            &format!("services.{name}"),
            None,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(
            &format!("services.{name}.base_rate_per_unit"),
            &service.base_rate_per_unit.to_string(),
            source.clone(),
        ));
        lines.push(render_line(
            &format!("services.{name}.permit_fee"),
            &service.permit_fee.to_string(),
            source.clone(),
        ));
        lines.push(render_line(
            &format!("services.{name}.minimum_total"),
            &service.minimum_total.to_string(),
            source.clone(),
        ));
        lines.push(render_line(
            &format!("services.{name}.price_range_pct"),
            &service.price_range_pct.to_string(),
            source.clone(),
        ));
        lines.push(render_line(
            &format!("services.{name}.options"),
            &format!(
                "{} materials, {} regions, {} timelines",
                service.materials.len(),
                service.regions.len(),
                service.timelines.len()
            ),
            source,
        ));
    }

    lines.join("\n")
}

#[derive(Clone)]
enum FieldSource {
    Env(&'static str),
    File(PathBuf),
    Default,
}

fn render_line(field: &str, value: &str, source: FieldSource) -> String {
    let source = match source {
        FieldSource::Env(key) => format!("env:{key}"),
        FieldSource::File(path) => format!("file:{}", path.display()),
        FieldSource::Default => "default".to_string(),
    };
    format!("  {field} = {value}  ({source})")
}

fn field_source(
    field: &str,
    env_key: Option<&'static str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> FieldSource {
    if let Some(key) = env_key {
        if env::var(key).is_ok_and(|value| !value.trim().is_empty()) {
            return FieldSource::Env(key);
        }
    }
    if let (Some(doc), Some(path)) = (config_file_doc, config_file_path) {
        if doc_has_field(doc, field) {
            return FieldSource::File(path.to_path_buf());
        }
    }
    FieldSource::Default
}

fn doc_has_field(doc: &Value, dotted_field: &str) -> bool {
    let mut current = doc;
    for segment in dotted_field.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("sitequote.toml"), PathBuf::from("config/sitequote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}
