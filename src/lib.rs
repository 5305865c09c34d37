pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod package;
pub mod pool;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod util;
