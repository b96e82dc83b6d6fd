pub mod bytes;

pub mod algorithm;
pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod next_action;
pub mod results;
pub mod state;
pub mod static_results;

pub use api::{error_with_diagnostics, with_diagnostics, AnyConnection, QueryResult, Statement};

pub const NULL_TERMINATOR: u8 = 0;
pub const UTF8_MB4_GENERAL_CI: u8 = 45;
