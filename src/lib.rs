// Pedantic: suppress noise for internal crate code.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

pub mod actions;
pub mod api;
pub mod app;
pub mod config;
pub mod engine;
pub mod export;
pub mod feed;
pub mod filter;
pub mod prefs;
pub mod query;
pub mod types;
pub mod ui;
pub mod util;
