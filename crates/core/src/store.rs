use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::domain::conversation::{ConversationState, SessionId};
use crate::errors::WorkflowError;

/// Process-wide keyed holder of conversation state with per-session turn
/// serialization. In-memory only; state does not survive a restart.
///
/// Locking layout: the outer map lock and the per-slot state lock are plain
/// sync locks held only for map/snapshot operations, never across an await.
/// The per-slot `turn` lock is an async mutex held for the duration of one
/// turn, which is what guarantees at-most-one in-flight turn per session
/// while leaving other sessions fully concurrent.
#[derive(Default)]
pub struct SessionStore {
    slots: RwLock<HashMap<SessionId, Arc<SessionSlot>>>,
}

struct SessionSlot {
    turn: tokio::sync::Mutex<()>,
    state: Mutex<ConversationState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> SessionId {
        let session_id = SessionId::random();
        let slot = Arc::new(SessionSlot {
            turn: tokio::sync::Mutex::new(()),
            state: Mutex::new(ConversationState::new(session_id.clone())),
        });

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.insert(session_id.clone(), slot);
        debug!(session_id = %session_id, "session created");
        session_id
    }

    pub fn get(&self, session_id: &SessionId) -> Result<ConversationState, WorkflowError> {
        let slot = self.slot(session_id)?;
        let state = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.clone())
    }

    /// Runs `turn_fn` against a snapshot of the session state and atomically
    /// commits the state it returns. Calls for the same session id are
    /// strictly serialized; distinct ids never block each other. If `turn_fn`
    /// fails, the previously persisted state is left untouched.
    pub async fn with_session<F, Fut, T>(
        &self,
        session_id: &SessionId,
        turn_fn: F,
    ) -> Result<T, WorkflowError>
    where
        F: FnOnce(ConversationState) -> Fut,
        Fut: Future<Output = Result<(ConversationState, T), WorkflowError>>,
    {
        let slot = self.slot(session_id)?;
        let _turn = slot.turn.lock().await;

        let snapshot = slot.state.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let (next_state, output) = turn_fn(snapshot).await?;

        *slot.state.lock().unwrap_or_else(PoisonError::into_inner) = next_state;
        Ok(output)
    }

    /// Sessions are destroyed only through this call, never silently.
    pub fn delete(&self, session_id: &SessionId) -> Result<(), WorkflowError> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots
            .remove(session_id)
            .map(|_| debug!(session_id = %session_id, "session deleted"))
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.clone()))
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, session_id: &SessionId) -> Result<Arc<SessionSlot>, WorkflowError> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(session_id)
            .cloned()
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.clone()))
    }
}
