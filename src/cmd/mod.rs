//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`serve`], [`validate`], or [`health`]. Each handler
//! lives in its own submodule.

pub mod health;
pub mod serve;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::GatehouseError;

pub async fn dispatch(cli: Cli) -> Result<(), GatehouseError> {
    match cli.command {
        Some(Commands::Serve(args)) => serve::execute(args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args),
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  gatehouse v{version}: host and path routing reverse proxy\n\n  \
         No command provided. To get started:\n\n    \
         gatehouse serve                   Start with ./gatehouse.yaml\n    \
         gatehouse serve -c prod.yaml      Start with a specific config file\n    \
         gatehouse --help                  See all commands and options\n"
    );
}
