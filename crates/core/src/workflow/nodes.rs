use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::domain::conversation::ImageRef;
use crate::domain::estimate::EstimateResult;

/// One step of the turn-scoped state machine. `InputRouter` runs once at the
/// head of a turn and is never the target of an edge, so the walk cannot
/// cycle back to it; `Start` runs once per session, at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Start,
    InputRouter,
    ImageHandler,
    InformationExtractor,
    StateUpdater,
    QuestionGenerator,
    Estimator,
    ResponseGenerator,
    Terminal,
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::InputRouter => "input_router",
            Self::ImageHandler => "image_handler",
            Self::InformationExtractor => "information_extractor",
            Self::StateUpdater => "state_updater",
            Self::QuestionGenerator => "question_generator",
            Self::Estimator => "estimator",
            Self::ResponseGenerator => "response_generator",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One external input: a text message, or an image reference with optional
/// accompanying text.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnInput {
    Text(String),
    Image { reference: ImageRef, caption: Option<String> },
}

impl TurnInput {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image { caption, .. } => caption.as_deref(),
        }
    }
}

/// Result of one single-pass workflow invocation. The trace lists the nodes
/// the walk visited, in order, excluding routing and `Terminal`.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub response: String,
    pub trace: Vec<Node>,
}

const RESET_PHRASES: [&str; 3] = ["new estimate", "start over", "recalculate"];

/// Fixed keyword match; deliberately dumb so behavior is predictable.
pub fn is_reset_intent(text: &str) -> bool {
    let normalized = text.to_ascii_lowercase();
    RESET_PHRASES.iter().any(|phrase| normalized.contains(phrase))
}

pub const GREETING: &str = "Welcome! I can put together a project estimate for you. \
     I'll ask a few questions as we go, and you can also upload photos of the site.";

pub const IMAGE_RECEIVED: &str =
    "Thanks, I've noted your image. It will be attached to the estimate.";

/// Exactly one question per missing field, options drawn from configuration
/// where the service is already known.
pub fn question_for(field: &str, service: Option<&ServiceConfig>) -> String {
    match field {
        "service_type" => {
            "What type of service are you looking for? (e.g. roofing)".to_string()
        }
        "square_footage" => {
            "What is the approximate square footage of the area?".to_string()
        }
        "location" => match service {
            Some(service) => format!(
                "Which region are you located in? Options: {}.",
                option_list(service.regions.keys())
            ),
            None => "Which region are you located in?".to_string(),
        },
        "material_type" => match service {
            Some(service) => format!(
                "What type of material would you prefer? Options include {}.",
                option_list(service.materials.keys())
            ),
            None => "What type of material would you prefer?".to_string(),
        },
        "timeline" => match service {
            Some(service) => format!(
                "What is your preferred timeline? ({})",
                option_list(service.timelines.keys())
            ),
            None => "What is your preferred timeline?".to_string(),
        },
        other => format!("Please tell me about the {}.", other.replace('_', " ")),
    }
}

fn option_list<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    keys.map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Renders the final estimate breakdown for the outbound message.
pub fn render_estimate(estimate: &EstimateResult) -> String {
    let mut lines = vec![
        format!("Here is your estimate for the {} project:", estimate.service_type),
        String::new(),
        format!("  Square footage:      {} sq ft", estimate.square_footage),
        format!("  Location:            {}", title_case(&estimate.location)),
        format!("  Material:            {}", title_case(&estimate.material_type)),
        format!("  Timeline:            {}", title_case(&estimate.timeline)),
    ];
    if !estimate.image_refs.is_empty() {
        lines.push(format!("  Images provided:     {}", estimate.image_refs.len()));
    }
    lines.extend([
        String::new(),
        format!("  Base cost:           {}", format_currency(estimate.base_cost)),
        format!("  Material cost:       {}", format_currency(estimate.material_cost)),
        format!("  Regional adjustment: {}", format_currency(estimate.region_adjustment)),
        format!("  Timeline adjustment: {}", format_currency(estimate.timeline_adjustment)),
        format!("  Permit fee:          {}", format_currency(estimate.permit_fee)),
        String::new(),
        format!("  Total estimate:      {}", format_currency(estimate.total)),
        format!(
            "  Expected range:      {} - {}",
            format_currency(estimate.price_range.low),
            format_currency(estimate.price_range.high)
        ),
        String::new(),
        "This is a preliminary estimate and may change after a site inspection.".to_string(),
    ]);
    lines.join("\n")
}

pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let negative = rounded < Decimal::ZERO;
    let raw = rounded.abs().to_string();

    let (int_part, frac_part) = match raw.split_once('.') {
        Some((int_part, frac_part)) => (int_part.to_string(), format!("{frac_part:0<2}")),
        None => (raw, "00".to_string()),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (index, digit) in int_part.chars().enumerate() {
        if index > 0 && (int_part.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}${grouped}.{frac_part}")
}

fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
