// Shared domain types. The engine, the feed and the terminal layer all import
// from here; none of those layers depends on another.

pub mod action;
pub mod event;
pub mod summary;

pub use action::*;
pub use event::*;
pub use summary::*;
