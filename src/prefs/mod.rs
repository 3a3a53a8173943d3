// Durable preferences: the live filter, UI toggles and named presets.

pub mod presets;
pub mod store;

pub use store::{PrefStore, Prefs, PrefsError, default_path};
