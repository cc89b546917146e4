pub mod cli;
pub mod fetch;
pub mod load_config;
pub mod upload;
pub mod vault;

pub use cli::{run, Cli, Commands};
