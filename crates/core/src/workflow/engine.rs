use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, MergePolicy};
use crate::domain::conversation::{ConversationState, FieldValue, Role};
use crate::errors::{EstimateError, WorkflowError};
use crate::estimate::{compute_estimate, EstimateInput};
use crate::extract::{FieldExtractor, ImageAnalyzer, NoopImageAnalyzer};
use crate::workflow::nodes::{
    is_reset_intent, question_for, render_estimate, Node, TurnInput, TurnOutcome, GREETING,
    IMAGE_RECEIVED,
};

const FALLBACK_PROMPT: &str = "Could you tell me a bit more about your project?";

/// Turn-scoped workflow engine: one bounded, linear pass through the node
/// table per external input. Routing happens exactly once at the head of the
/// turn and no edge targets the router, so intra-turn cycles are impossible
/// by construction rather than by configuration.
pub struct WorkflowEngine<E, A = NoopImageAnalyzer> {
    config: Arc<AppConfig>,
    extractor: E,
    analyzer: A,
}

struct TurnCursor {
    input: TurnInput,
    ack: Option<&'static str>,
    response: Option<String>,
}

impl<E> WorkflowEngine<E, NoopImageAnalyzer>
where
    E: FieldExtractor,
{
    pub fn new(config: Arc<AppConfig>, extractor: E) -> Self {
        Self::with_analyzer(config, extractor, NoopImageAnalyzer)
    }
}

impl<E, A> WorkflowEngine<E, A>
where
    E: FieldExtractor,
    A: ImageAnalyzer,
{
    pub fn with_analyzer(config: Arc<AppConfig>, extractor: E, analyzer: A) -> Self {
        Self { config, extractor, analyzer }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Session opener: greeting plus the first question. Runs once, when the
    /// session is created, so per-turn walks never include `Start`.
    pub fn start(&self, state: &mut ConversationState) -> String {
        info!(session_id = %state.session_id, node = %Node::Start, "starting conversation");
        state.push_history(Role::Assistant, GREETING);

        let question = self.ask_next_question(state);
        state.push_history(Role::Assistant, question.clone());
        format!("{GREETING}\n\n{question}")
    }

    /// Exactly one pass per external input. On failure the caller discards
    /// `state`; the store keeps the last committed snapshot.
    pub async fn run_turn(
        &self,
        state: &mut ConversationState,
        input: TurnInput,
    ) -> Result<TurnOutcome, WorkflowError> {
        match &input {
            TurnInput::Text(text) => state.push_history(Role::User, text.clone()),
            TurnInput::Image { reference, caption } => {
                let note = match caption {
                    Some(caption) => format!("[image {reference}] {caption}"),
                    None => format!("[image {reference}]"),
                };
                state.push_history(Role::User, note);
            }
        }

        if input.text().is_some_and(is_reset_intent) {
            info!(
                session_id = %state.session_id,
                node = %Node::InputRouter,
                "reset intent detected, clearing completion state"
            );
            state.reset_completion();
        }

        let mut node = match &input {
            TurnInput::Image { .. } => Node::ImageHandler,
            TurnInput::Text(_) => Node::InformationExtractor,
        };
        debug!(
            session_id = %state.session_id,
            node = %Node::InputRouter,
            next = %node,
            "routed turn input"
        );

        let mut turn = TurnCursor { input, ack: None, response: None };
        let mut trace = Vec::new();
        while node != Node::Terminal {
            trace.push(node);
            if trace.len() > self.config.workflow.execution_limit {
                error!(
                    session_id = %state.session_id,
                    node = %node,
                    visited = trace.len(),
                    "execution limit exceeded, aborting turn"
                );
                return Err(WorkflowError::ExecutionLimitExceeded {
                    session_id: state.session_id.clone(),
                    visited: trace.len(),
                });
            }
            node = self.step(node, state, &mut turn).await;
        }

        let body = turn.response.unwrap_or_else(|| FALLBACK_PROMPT.to_string());
        let response = match turn.ack {
            Some(ack) => format!("{ack}\n\n{body}"),
            None => body,
        };
        state.push_history(Role::Assistant, response.clone());
        Ok(TurnOutcome { response, trace })
    }

    async fn step(&self, node: Node, state: &mut ConversationState, turn: &mut TurnCursor) -> Node {
        match node {
            Node::ImageHandler => self.handle_image(state, turn).await,
            Node::InformationExtractor => self.extract_fields(state, turn).await,
            Node::StateUpdater => self.update_state(state),
            Node::QuestionGenerator => {
                let question = self.ask_next_question(state);
                turn.response = Some(question);
                Node::Terminal
            }
            Node::Estimator => self.run_estimator(state),
            Node::ResponseGenerator => {
                turn.response = Some(self.render_response(state));
                Node::Terminal
            }
            // Start runs outside per-turn walks; Terminal ends the loop. No
            // arm may ever return InputRouter.
            Node::Start | Node::InputRouter | Node::Terminal => Node::Terminal,
        }
    }

    async fn handle_image(&self, state: &mut ConversationState, turn: &mut TurnCursor) -> Node {
        let TurnInput::Image { reference, caption } = &turn.input else {
            return Node::StateUpdater;
        };

        state.image_refs.push(reference.clone());
        turn.ack = Some(IMAGE_RECEIVED);
        info!(
            session_id = %state.session_id,
            node = %Node::ImageHandler,
            image = %reference,
            "image reference recorded"
        );

        let enriched = match self.analyzer.analyze(reference).await {
            Ok(fields) => fields,
            Err(error) => {
                warn!(
                    session_id = %state.session_id,
                    node = %Node::ImageHandler,
                    %error,
                    "image analysis unavailable, continuing without enrichment"
                );
                BTreeMap::new()
            }
        };
        self.merge_fields(state, enriched, Node::ImageHandler);

        if caption.is_some() {
            Node::InformationExtractor
        } else {
            Node::StateUpdater
        }
    }

    async fn extract_fields(&self, state: &mut ConversationState, turn: &mut TurnCursor) -> Node {
        let text = turn.input.text().unwrap_or_default();
        let recognized = self.config.recognized_fields(state.service_type.as_deref());
        let timeout = Duration::from_secs(self.config.workflow.extraction_timeout_secs);

        let extracted =
            match tokio::time::timeout(timeout, self.extractor.extract(text, &recognized)).await {
                Ok(Ok(fields)) => fields,
                Ok(Err(error)) => {
                    warn!(
                        session_id = %state.session_id,
                        node = %Node::InformationExtractor,
                        %error,
                        "extraction unavailable, continuing with an empty result"
                    );
                    BTreeMap::new()
                }
                Err(_) => {
                    warn!(
                        session_id = %state.session_id,
                        node = %Node::InformationExtractor,
                        timeout_secs = self.config.workflow.extraction_timeout_secs,
                        "extraction timed out, continuing with an empty result"
                    );
                    BTreeMap::new()
                }
            };

        self.merge_fields(state, extracted, Node::InformationExtractor);
        Node::StateUpdater
    }

    fn update_state(&self, state: &ConversationState) -> Node {
        // Reset intent already cleared the estimate at the head of the turn,
        // so a surviving estimate short-circuits to a cached re-render. This
        // is what keeps the Estimator call count at one per estimate.
        if state.final_estimate.is_some() {
            return Node::ResponseGenerator;
        }

        if self.missing_fields(state).is_empty() {
            Node::Estimator
        } else {
            Node::QuestionGenerator
        }
    }

    fn run_estimator(&self, state: &mut ConversationState) -> Node {
        match self.compute_from_state(state) {
            Ok(estimate) => {
                info!(
                    session_id = %state.session_id,
                    node = %Node::Estimator,
                    total = %estimate.total,
                    "estimate computed"
                );
                state.pending_question_field = None;
                state.final_estimate = Some(estimate);
                Node::ResponseGenerator
            }
            Err(error) => {
                let field = error.field().to_string();
                warn!(
                    session_id = %state.session_id,
                    node = %Node::Estimator,
                    field = %field,
                    "estimate validation failed, asking a clarifying question"
                );
                state.extracted_fields.remove(&field);
                if field == "service_type" {
                    state.service_type = None;
                }
                Node::QuestionGenerator
            }
        }
    }

    fn render_response(&self, state: &ConversationState) -> String {
        match &state.final_estimate {
            Some(estimate) => render_estimate(estimate),
            None => {
                let service =
                    state.service_type.as_deref().and_then(|name| self.config.service(name));
                match &state.pending_question_field {
                    Some(field) => question_for(field, service),
                    None => FALLBACK_PROMPT.to_string(),
                }
            }
        }
    }

    pub fn missing_fields(&self, state: &ConversationState) -> Vec<String> {
        self.config
            .required_fields(state.service_type.as_deref())
            .into_iter()
            .filter(|field| !state.has_field(field))
            .collect()
    }

    fn ask_next_question(&self, state: &mut ConversationState) -> String {
        let missing = self.missing_fields(state);
        let order = self.config.question_order(state.service_type.as_deref());
        let field = order
            .into_iter()
            .find(|candidate| missing.contains(candidate))
            .or_else(|| missing.first().cloned())
            .unwrap_or_else(|| "service_type".to_string());

        let service = state.service_type.as_deref().and_then(|name| self.config.service(name));
        let question = question_for(&field, service);
        debug!(
            session_id = %state.session_id,
            node = %Node::QuestionGenerator,
            field = %field,
            "asking for missing field"
        );
        state.pending_question_field = Some(field);
        question
    }

    fn merge_fields(
        &self,
        state: &mut ConversationState,
        incoming: BTreeMap<String, FieldValue>,
        node: Node,
    ) {
        if incoming.is_empty() {
            return;
        }
        let recognized = self.config.recognized_fields(state.service_type.as_deref());

        for (field, value) in incoming {
            if !recognized.contains(&field) {
                warn!(
                    session_id = %state.session_id,
                    node = %node,
                    field = %field,
                    "dropping unrecognized extracted field"
                );
                continue;
            }

            if state.has_field(&field)
                && self.config.workflow.merge_policy(&field) == MergePolicy::FirstWins
            {
                debug!(
                    session_id = %state.session_id,
                    node = %node,
                    field = %field,
                    "keeping first captured value"
                );
                continue;
            }

            if field == "service_type" {
                let Some(name) =
                    value.as_text().map(|text| text.trim().to_ascii_lowercase())
                else {
                    continue;
                };
                if self.config.service(&name).is_none() {
                    warn!(
                        session_id = %state.session_id,
                        node = %node,
                        service_type = %name,
                        "ignoring unconfigured service type"
                    );
                    continue;
                }
                state.service_type = Some(name.clone());
                state.extracted_fields.insert(field, FieldValue::Text(name));
                continue;
            }

            state.extracted_fields.insert(field, value);
        }
    }

    fn compute_from_state(
        &self,
        state: &ConversationState,
    ) -> Result<crate::domain::estimate::EstimateResult, EstimateError> {
        let service_type = state
            .service_type
            .as_deref()
            .ok_or_else(|| EstimateError::validation("service_type"))?;
        let service = self
            .config
            .service(service_type)
            .ok_or_else(|| EstimateError::validation("service_type"))?;

        let square_footage = state
            .extracted_fields
            .get("square_footage")
            .and_then(FieldValue::as_number)
            .ok_or_else(|| EstimateError::validation("square_footage"))?;
        let location = self.text_field(state, "location")?;
        let material_type = self.text_field(state, "material_type")?;
        let timeline = self.text_field(state, "timeline")?;

        compute_estimate(
            &EstimateInput {
                service_type,
                square_footage,
                location: &location,
                material_type: &material_type,
                timeline: &timeline,
                image_refs: &state.image_refs,
            },
            service,
        )
    }

    fn text_field(&self, state: &ConversationState, field: &str) -> Result<String, EstimateError> {
        state
            .extracted_fields
            .get(field)
            .map(|value| value.to_string())
            .ok_or_else(|| EstimateError::validation(field))
    }
}
