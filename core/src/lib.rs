pub mod auth;
pub mod backends;
pub mod config;
pub mod errors;
pub mod events;
pub mod files;
pub mod orchestrator;
pub mod remote;
pub mod session;
pub mod transfer;

pub use orchestrator::SessionOrchestrator;
