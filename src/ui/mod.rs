// Terminal presentation. `lines` turns session state into styled text and is
// pure; `screen` owns the raw-mode terminal and paints frames.

pub mod lines;
pub mod screen;

pub use lines::{Line, Target, Tone};
pub use screen::{Frame, Screen};
