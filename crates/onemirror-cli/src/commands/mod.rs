pub mod auth;
pub mod completions;
pub mod config;
pub mod reset;
pub mod run;
pub mod status;
pub mod sync;
