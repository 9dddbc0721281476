//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`]. Each handler
//! lives in its own submodule.

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::TelltaleError;

pub async fn dispatch(cli: Cli) -> Result<(), TelltaleError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
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
        "\n  telltale v{version}: HTTP reverse proxy with per-service metrics\n\n  \
         No command provided. To get started:\n\n    \
         telltale run                   Start the proxy (auto-detects ./telltale.yaml)\n    \
         telltale run -c routes.yaml    Start with a specific config file\n    \
         telltale validate routes.yaml  Check a config file\n    \
         telltale --help                See all commands and options\n"
    );
}
