//! Headless driver for the immersive player: CLI flags, the stdin command
//! protocol and the wiring of the lifecycle manager to simulated backends.

pub mod cli;
pub mod commands;
pub mod error;
pub mod runtime;

pub use cli::{parse_cli_flags, print_cli_help, CliFlags};
pub use commands::{parse_command, PlayerCommand};
pub use error::{AppError, AppResult};
pub use runtime::{run_command_loop, CatalogListing, CommandOutcome, PlayerRuntime};
