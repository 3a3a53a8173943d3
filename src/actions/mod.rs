// Mutating moderation actions: card suggestions and the dry-run protocol.

pub mod flow;
pub mod quick;

pub use flow::{ActionCommand, ActionFlow, ActionSource, FlowError, FlowOutcome, FlowState};
