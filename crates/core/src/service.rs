use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::domain::conversation::{ConversationState, ImageRef, SessionId};
use crate::errors::WorkflowError;
use crate::extract::{FieldExtractor, ImageAnalyzer, NoopImageAnalyzer};
use crate::store::SessionStore;
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::nodes::{Node, TurnInput, TurnOutcome};

/// The inbound boundary a transport layer talks to. Owns the session store
/// and the workflow engine; everything here is transport-agnostic.
pub struct EstimationService<E, A = NoopImageAnalyzer> {
    store: SessionStore,
    engine: WorkflowEngine<E, A>,
}

impl<E> EstimationService<E, NoopImageAnalyzer>
where
    E: FieldExtractor,
{
    pub fn new(config: Arc<AppConfig>, extractor: E) -> Self {
        Self::with_analyzer(config, extractor, NoopImageAnalyzer)
    }
}

impl<E, A> EstimationService<E, A>
where
    E: FieldExtractor,
    A: ImageAnalyzer,
{
    pub fn with_analyzer(config: Arc<AppConfig>, extractor: E, analyzer: A) -> Self {
        Self {
            store: SessionStore::new(),
            engine: WorkflowEngine::with_analyzer(config, extractor, analyzer),
        }
    }

    /// Creates a session and runs the one-time opener, returning the greeting
    /// and the first question.
    pub async fn create_session(&self) -> Result<(SessionId, String), WorkflowError> {
        let session_id = self.store.create();
        let engine = &self.engine;
        let greeting = self
            .store
            .with_session(&session_id, |mut state| async move {
                let greeting = engine.start(&mut state);
                Ok((state, greeting))
            })
            .await?;
        Ok((session_id, greeting))
    }

    pub async fn process_message(
        &self,
        session_id: &SessionId,
        text: &str,
    ) -> Result<(String, ConversationState), WorkflowError> {
        let (outcome, state) =
            self.process_turn(session_id, TurnInput::Text(text.to_string())).await?;
        Ok((outcome.response, state))
    }

    pub async fn process_image(
        &self,
        session_id: &SessionId,
        image: ImageRef,
        caption: Option<String>,
    ) -> Result<(String, ConversationState), WorkflowError> {
        let (outcome, state) =
            self.process_turn(session_id, TurnInput::Image { reference: image, caption }).await?;
        Ok((outcome.response, state))
    }

    /// Full turn entry point; exposes the visited-node trace alongside the
    /// response for callers that report on workflow behavior.
    pub async fn process_turn(
        &self,
        session_id: &SessionId,
        input: TurnInput,
    ) -> Result<(TurnOutcome, ConversationState), WorkflowError> {
        let engine = &self.engine;
        self.store
            .with_session(session_id, |mut state| async move {
                let outcome = engine.run_turn(&mut state, input).await?;
                let result = (outcome, state.clone());
                Ok((state, result))
            })
            .await
    }

    /// Snapshot of the current conversation, for inspection endpoints.
    pub fn conversation(&self, session_id: &SessionId) -> Result<ConversationState, WorkflowError> {
        self.store.get(session_id)
    }

    pub fn missing_fields(&self, state: &ConversationState) -> Vec<String> {
        self.engine.missing_fields(state)
    }

    /// Same clearing rules as an in-conversation reset message: the estimate
    /// and captured fields go, the transcript and session id stay.
    pub async fn reset_session(&self, session_id: &SessionId) -> Result<(), WorkflowError> {
        self.store
            .with_session(session_id, |mut state| async move {
                info!(
                    session_id = %state.session_id,
                    node = %Node::StateUpdater,
                    "session reset requested by caller"
                );
                state.reset_completion();
                Ok((state, ()))
            })
            .await
    }

    pub fn delete_session(&self, session_id: &SessionId) -> Result<(), WorkflowError> {
        self.store.delete(session_id)
    }
}
