use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fields every service understands, in fixed question-priority order.
/// Service-specific custom fields follow these, in declared order.
pub const STANDARD_FIELDS: [&str; 5] =
    ["service_type", "square_footage", "location", "material_type", "timeline"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub services: BTreeMap<String, ServiceConfig>,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

/// Pricing inputs for one service type. Loaded once at process start and
/// treated as immutable for the process lifetime.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub base_rate_per_unit: Decimal,
    pub materials: BTreeMap<String, Decimal>,
    pub regions: BTreeMap<String, Decimal>,
    pub timelines: BTreeMap<String, Decimal>,
    pub permit_fee: Decimal,
    pub price_range_pct: Decimal,
    /// Display floor: totals are clamped up to this before the range is
    /// computed, so tiny configured rates cannot produce misleading quotes.
    #[serde(default)]
    pub minimum_total: Decimal,
    pub required_fields: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub execution_limit: usize,
    pub extraction_timeout_secs: u64,
    pub default_merge: MergePolicy,
    pub field_merge: BTreeMap<String, MergePolicy>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Whether a later extraction may overwrite an already-captured field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Keep the first captured value; later mentions are ignored.
    FirstWins,
    /// Treat later mentions as corrections and overwrite.
    LastWins,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert("roofing".to_string(), ServiceConfig::default_roofing());

        Self {
            services,
            workflow: WorkflowConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            execution_limit: 250,
            extraction_timeout_secs: 10,
            default_merge: MergePolicy::LastWins,
            field_merge: BTreeMap::new(),
        }
    }
}

impl ServiceConfig {
    fn default_roofing() -> Self {
        let multipliers = |entries: &[(&str, Decimal)]| {
            entries.iter().map(|(name, m)| (name.to_string(), *m)).collect::<BTreeMap<_, _>>()
        };

        Self {
            base_rate_per_unit: Decimal::new(5, 0),
            materials: multipliers(&[
                ("asphalt", Decimal::new(10, 1)),
                ("metal", Decimal::new(12, 1)),
                ("tile", Decimal::new(14, 1)),
                ("slate", Decimal::new(18, 1)),
            ]),
            regions: multipliers(&[
                ("northeast", Decimal::new(12, 1)),
                ("midwest", Decimal::new(95, 2)),
                ("south", Decimal::new(9, 1)),
                ("west", Decimal::new(11, 1)),
            ]),
            timelines: multipliers(&[
                ("standard", Decimal::new(10, 1)),
                ("expedited", Decimal::new(125, 2)),
                ("emergency", Decimal::new(15, 1)),
            ]),
            permit_fee: Decimal::new(250, 0),
            price_range_pct: Decimal::new(1, 1),
            minimum_total: Decimal::new(500, 0),
            required_fields: STANDARD_FIELDS.iter().map(|field| field.to_string()).collect(),
        }
    }
}

impl ServiceConfig {
    /// Estimate lookups are case-insensitive, so every multiplier table key
    /// is stored lowercased regardless of how a config file spells it.
    fn normalize_keys(&mut self) {
        for table in [&mut self.materials, &mut self.regions, &mut self.timelines] {
            let normalized = std::mem::take(table)
                .into_iter()
                .map(|(key, multiplier)| (key.trim().to_ascii_lowercase(), multiplier))
                .collect();
            *table = normalized;
        }
    }
}

impl WorkflowConfig {
    pub fn merge_policy(&self, field: &str) -> MergePolicy {
        self.field_merge.get(field).copied().unwrap_or(self.default_merge)
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for MergePolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first_wins" => Ok(Self::FirstWins),
            "last_wins" => Ok(Self::LastWins),
            other => Err(ConfigError::Validation(format!(
                "unsupported merge policy `{other}` (expected first_wins|last_wins)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("sitequote.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn service(&self, service_type: &str) -> Option<&ServiceConfig> {
        self.services.get(service_type)
    }

    /// Required fields for the current completeness check. Before a service is
    /// chosen, the only thing the workflow can sensibly require is the service
    /// type itself.
    pub fn required_fields(&self, service_type: Option<&str>) -> Vec<String> {
        match service_type.and_then(|name| self.services.get(name)) {
            Some(service) => service.required_fields.clone(),
            None => vec!["service_type".to_string()],
        }
    }

    /// The closed key set the extraction collaborator may populate. With no
    /// service chosen yet this is the union over all configured services, so
    /// an opening message like "1200 sq ft roof in the west" loses nothing.
    pub fn recognized_fields(&self, service_type: Option<&str>) -> BTreeSet<String> {
        let mut recognized: BTreeSet<String> =
            STANDARD_FIELDS.iter().map(|field| field.to_string()).collect();

        match service_type.and_then(|name| self.services.get(name)) {
            Some(service) => recognized.extend(service.required_fields.iter().cloned()),
            None => {
                for service in self.services.values() {
                    recognized.extend(service.required_fields.iter().cloned());
                }
            }
        }
        recognized
    }

    /// Fixed question priority: the standard fields first, then any custom
    /// fields the service declares, in declared order.
    pub fn question_order(&self, service_type: Option<&str>) -> Vec<String> {
        let mut order: Vec<String> =
            STANDARD_FIELDS.iter().map(|field| field.to_string()).collect();

        if let Some(service) = service_type.and_then(|name| self.services.get(name)) {
            for field in &service.required_fields {
                if !order.iter().any(|known| known == field) {
                    order.push(field.clone());
                }
            }
        }
        order
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(services) = patch.services {
            for (name, mut service) in services {
                service.normalize_keys();
                self.services.insert(name.to_ascii_lowercase(), service);
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(execution_limit) = workflow.execution_limit {
                self.workflow.execution_limit = execution_limit;
            }
            if let Some(extraction_timeout_secs) = workflow.extraction_timeout_secs {
                self.workflow.extraction_timeout_secs = extraction_timeout_secs;
            }
            if let Some(default_merge) = workflow.default_merge {
                self.workflow.default_merge = default_merge;
            }
            if let Some(field_merge) = workflow.field_merge {
                self.workflow.field_merge = field_merge;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SITEQUOTE_WORKFLOW_EXECUTION_LIMIT") {
            self.workflow.execution_limit =
                parse_usize("SITEQUOTE_WORKFLOW_EXECUTION_LIMIT", &value)?;
        }
        if let Some(value) = read_env("SITEQUOTE_WORKFLOW_EXTRACTION_TIMEOUT_SECS") {
            self.workflow.extraction_timeout_secs =
                parse_u64("SITEQUOTE_WORKFLOW_EXTRACTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SITEQUOTE_WORKFLOW_DEFAULT_MERGE") {
            self.workflow.default_merge = value.parse()?;
        }

        let log_level =
            read_env("SITEQUOTE_LOGGING_LEVEL").or_else(|| read_env("SITEQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SITEQUOTE_LOGGING_FORMAT").or_else(|| read_env("SITEQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::Validation(
                "at least one service must be configured".to_string(),
            ));
        }

        for (name, service) in &self.services {
            validate_service(name, service)?;
        }

        if self.workflow.execution_limit == 0 {
            return Err(ConfigError::Validation(
                "workflow.execution_limit must be greater than zero".to_string(),
            ));
        }
        if self.workflow.extraction_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "workflow.extraction_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_service(name: &str, service: &ServiceConfig) -> Result<(), ConfigError> {
    if service.base_rate_per_unit <= Decimal::ZERO {
        return Err(ConfigError::Validation(format!(
            "service `{name}`: base_rate_per_unit must be positive"
        )));
    }
    if service.permit_fee < Decimal::ZERO || service.minimum_total < Decimal::ZERO {
        return Err(ConfigError::Validation(format!(
            "service `{name}`: fees and floors must not be negative"
        )));
    }
    if service.price_range_pct < Decimal::ZERO || service.price_range_pct >= Decimal::ONE {
        return Err(ConfigError::Validation(format!(
            "service `{name}`: price_range_pct must be in [0, 1)"
        )));
    }
    if service.required_fields.is_empty() {
        return Err(ConfigError::Validation(format!(
            "service `{name}`: required_fields must not be empty"
        )));
    }

    for (table, multipliers) in [
        ("materials", &service.materials),
        ("regions", &service.regions),
        ("timelines", &service.timelines),
    ] {
        if multipliers.is_empty() {
            return Err(ConfigError::Validation(format!(
                "service `{name}`: {table} must declare at least one option"
            )));
        }
        if multipliers.values().any(|multiplier| *multiplier <= Decimal::ZERO) {
            return Err(ConfigError::Validation(format!(
                "service `{name}`: {table} multipliers must be positive"
            )));
        }
    }

    Ok(())
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("sitequote.toml"), PathBuf::from("config/sitequote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    services: Option<BTreeMap<String, ServiceConfig>>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    execution_limit: Option<usize>,
    extraction_timeout_secs: Option<u64>,
    default_merge: Option<MergePolicy>,
    field_merge: Option<BTreeMap<String, MergePolicy>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal::Decimal;

    use crate::config::{AppConfig, ConfigError, LoadOptions, MergePolicy};

    #[test]
    fn default_config_is_valid_and_includes_roofing() {
        let config = AppConfig::default();
        config.validate().expect("default config validates");

        let roofing = config.service("roofing").expect("roofing is configured");
        assert_eq!(roofing.base_rate_per_unit, Decimal::new(5, 0));
        assert_eq!(roofing.materials.get("tile"), Some(&Decimal::new(14, 1)));
        assert_eq!(roofing.required_fields.len(), 5);
    }

    #[test]
    fn file_patch_adds_a_service_and_tunes_the_workflow() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[workflow]
execution_limit = 64
default_merge = "first_wins"

[workflow.field_merge]
square_footage = "last_wins"

[services.flooring]
base_rate_per_unit = 3.5
permit_fee = 100
price_range_pct = 0.15
required_fields = ["service_type", "square_footage", "location", "material_type", "timeline"]

[services.flooring.materials]
hardwood = 1.6
laminate = 1.0

[services.flooring.regions]
west = 1.1
south = 0.9

[services.flooring.timelines]
standard = 1.0
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect("patched config loads");

        assert_eq!(config.workflow.execution_limit, 64);
        assert_eq!(config.workflow.default_merge, MergePolicy::FirstWins);
        assert_eq!(config.workflow.merge_policy("square_footage"), MergePolicy::LastWins);
        assert_eq!(config.workflow.merge_policy("location"), MergePolicy::FirstWins);
        assert!(config.service("flooring").is_some());
        assert!(config.service("roofing").is_some(), "defaults survive patching");
    }

    #[test]
    fn patched_multiplier_tables_match_regardless_of_key_casing() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[services.roofing]
base_rate_per_unit = 5
permit_fee = 250
price_range_pct = 0.1
required_fields = ["service_type", "square_footage", "location", "material_type", "timeline"]

[services.roofing.materials]
Tile = 1.4

[services.roofing.regions]
West = 1.1

[services.roofing.timelines]
Standard = 1.0
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect("patched config loads");

        let roofing = config.service("roofing").expect("roofing configured");
        assert_eq!(roofing.regions.get("west"), Some(&Decimal::new(11, 1)));
        assert!(!roofing.regions.contains_key("West"));
        assert_eq!(roofing.materials.get("tile"), Some(&Decimal::new(14, 1)));
        assert_eq!(roofing.timelines.get("standard"), Some(&Decimal::new(10, 1)));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("definitely-not-here.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn out_of_range_price_range_pct_is_rejected() {
        let mut config = AppConfig::default();
        config
            .services
            .get_mut("roofing")
            .expect("roofing exists")
            .price_range_pct = Decimal::new(15, 1);

        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn recognized_fields_are_the_union_before_a_service_is_chosen() {
        let mut config = AppConfig::default();
        let mut flooring = config.service("roofing").expect("roofing").clone();
        flooring.required_fields.push("subfloor_condition".to_string());
        config.services.insert("flooring".to_string(), flooring);

        let before = config.recognized_fields(None);
        assert!(before.contains("subfloor_condition"));

        let after = config.recognized_fields(Some("roofing"));
        assert!(!after.contains("subfloor_condition"));
        assert!(after.contains("square_footage"));
    }

    #[test]
    fn question_order_appends_custom_fields_after_standard_ones() {
        let mut config = AppConfig::default();
        let mut roofing = config.service("roofing").expect("roofing").clone();
        roofing.required_fields.push("roof_pitch".to_string());
        config.services.insert("roofing".to_string(), roofing);

        let order = config.question_order(Some("roofing"));
        assert_eq!(order.first().map(String::as_str), Some("service_type"));
        assert_eq!(order.last().map(String::as_str), Some("roof_pitch"));
    }
}
