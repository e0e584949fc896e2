pub mod conversation;
pub mod estimate;

pub use conversation::{ConversationState, FieldValue, HistoryEntry, ImageRef, Role, SessionId};
pub use estimate::{EstimateResult, PriceRange};
