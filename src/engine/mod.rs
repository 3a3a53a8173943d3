// engine module: backend engine running on its own thread

pub mod backend;
mod interface;
mod refresh;
pub mod stub;

pub use backend::HttpEngine;
pub use interface::{Engine, EngineHandle, Event, Request, Scope};
pub use refresh::HeadPollScheduler;
pub use stub::{ActionLog, StubEngine};
