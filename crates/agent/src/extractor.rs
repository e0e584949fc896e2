use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use sitequote_core::{ExtractionUnavailable, FieldExtractor, FieldValue};

use crate::llm::LlmClient;

/// Deterministic lexical extractor. Matches fixed keyword tables against a
/// normalized token stream; never guesses beyond them. Anything it misses
/// comes back to the user as one clarifying question, so precision beats
/// recall here.
#[derive(Clone, Debug, Default)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_fields(&self, text: &str, recognized: &BTreeSet<String>) -> BTreeMap<String, FieldValue> {
        let normalized = normalize_text(text);
        let tokens = tokenize(&normalized);
        let mut fields = BTreeMap::new();

        if recognized.contains("service_type") {
            if let Some(service) = extract_service(&tokens) {
                fields.insert("service_type".to_string(), FieldValue::Text(service));
            }
        }
        if recognized.contains("square_footage") {
            if let Some(sqft) = extract_square_footage(&tokens) {
                fields.insert("square_footage".to_string(), FieldValue::Number(sqft));
            }
        }
        if recognized.contains("location") {
            if let Some(region) = match_token(&tokens, REGIONS) {
                fields.insert("location".to_string(), FieldValue::Text(region));
            }
        }
        if recognized.contains("material_type") {
            if let Some(material) = match_token(&tokens, MATERIALS) {
                fields.insert("material_type".to_string(), FieldValue::Text(material));
            }
        }
        if recognized.contains("timeline") {
            if let Some(timeline) = match_token(&tokens, TIMELINES) {
                fields.insert("timeline".to_string(), FieldValue::Text(timeline));
            }
        }

        fields
    }
}

#[async_trait]
impl FieldExtractor for KeywordExtractor {
    async fn extract(
        &self,
        text: &str,
        recognized: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, FieldValue>, ExtractionUnavailable> {
        Ok(self.extract_fields(text, recognized))
    }
}

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase()
}

/// Commas are dropped rather than split on, so "2,000" survives as one
/// numeric token. Dots survive inside tokens for decimals like "2.5" but
/// are trimmed at token edges so "west." still matches "west".
fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || character == '.' {
            sanitized.push(character);
        } else if character != ',' {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_matches('.').to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

/// (canonical value, tokens that mean it)
type Synonyms = &'static [(&'static str, &'static [&'static str])];

const SERVICES: Synonyms = &[("roofing", &["roofing", "roof", "reroof", "shingles", "shingle"])];

const REGIONS: Synonyms = &[
    ("northeast", &["northeast"]),
    ("midwest", &["midwest"]),
    ("south", &["south", "southern"]),
    ("west", &["west", "western"]),
];

const MATERIALS: Synonyms = &[
    ("asphalt", &["asphalt", "shingle", "shingles"]),
    ("metal", &["metal", "steel", "aluminum"]),
    ("tile", &["tile", "tiles", "clay"]),
    ("slate", &["slate"]),
];

const TIMELINES: Synonyms = &[
    ("standard", &["standard", "normal", "whenever", "flexible"]),
    ("expedited", &["expedited", "rush", "rushed", "soon", "quickly"]),
    ("emergency", &["emergency", "asap", "urgent", "urgently", "immediately", "today"]),
];

/// Token-level match so "west" never fires inside "midwest".
fn match_token(tokens: &[String], table: Synonyms) -> Option<String> {
    for token in tokens {
        for (canonical, synonyms) in table {
            if synonyms.contains(&token.as_str()) {
                return Some((*canonical).to_string());
            }
        }
    }
    None
}

fn extract_service(tokens: &[String]) -> Option<String> {
    match_token(tokens, SERVICES)
}

const AREA_UNITS: [&str; 8] =
    ["sq", "sqft", "sqf", "square", "feet", "ft", "foot", "sf"];

/// A number followed by an area unit wins; a message that is nothing but a
/// number is taken as an answer to the square footage question.
fn extract_square_footage(tokens: &[String]) -> Option<f64> {
    for window in tokens.windows(2) {
        if let [value, unit] = window {
            if AREA_UNITS.contains(&unit.as_str()) {
                if let Ok(sqft) = value.parse::<f64>() {
                    return Some(sqft);
                }
            }
        }
    }
    if let [only] = tokens {
        if let Ok(sqft) = only.parse::<f64>() {
            return Some(sqft);
        }
    }
    None
}

/// Extractor backed by a completion client. The prompt pins the output to a
/// flat JSON object keyed by the recognized field names; anything that does
/// not parse as that is treated as "nothing extracted" rather than an error.
pub struct LlmExtractor<C> {
    client: C,
}

impl<C> LlmExtractor<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn prompt(text: &str, recognized: &BTreeSet<String>) -> String {
        let fields = recognized.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
        format!(
            "Extract project details from the customer message below.\n\
             Reply with a single flat JSON object. Use only these keys, and \
             only when the message states a value for them: {fields}.\n\
             Use JSON numbers for numeric values and lowercase strings for \
             the rest. Reply with {{}} if nothing applies.\n\n\
             Customer message:\n{text}"
        )
    }

    fn parse_completion(completion: &str, recognized: &BTreeSet<String>) -> BTreeMap<String, FieldValue> {
        // Providers love to wrap JSON in prose or code fences.
        let trimmed = completion.trim();
        let body = match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(open), Some(close)) if open < close => &trimmed[open..=close],
            _ => {
                warn!("completion contained no JSON object, ignoring");
                return BTreeMap::new();
            }
        };

        let parsed: Value = match serde_json::from_str(body) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(%error, "completion was not valid JSON, ignoring");
                return BTreeMap::new();
            }
        };
        let Value::Object(object) = parsed else {
            warn!("completion JSON was not an object, ignoring");
            return BTreeMap::new();
        };

        let mut fields = BTreeMap::new();
        for (key, value) in object {
            if !recognized.contains(&key) {
                debug!(field = %key, "dropping unrecognized field from completion");
                continue;
            }
            let value = match value {
                Value::Number(number) => match number.as_f64() {
                    Some(number) => FieldValue::Number(number),
                    None => continue,
                },
                Value::String(text) => FieldValue::Text(text.trim().to_ascii_lowercase()),
                _ => continue,
            };
            fields.insert(key, value);
        }
        fields
    }
}

#[async_trait]
impl<C> FieldExtractor for LlmExtractor<C>
where
    C: LlmClient,
{
    async fn extract(
        &self,
        text: &str,
        recognized: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, FieldValue>, ExtractionUnavailable> {
        let prompt = Self::prompt(text, recognized);
        let completion = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ExtractionUnavailable { reason: error.to_string() })?;
        Ok(Self::parse_completion(&completion, recognized))
    }
}
