//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`render`], [`init`], or [`health`].
//! Each handler lives in its own submodule.

pub mod health;
pub mod init;
pub mod render;
pub mod run;

use crate::cli::{Cli, Commands};
use crate::error::IngressError;

pub async fn dispatch(cli: Cli) -> Result<(), IngressError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Render(args)) => render::execute(*args).await,
        Some(Commands::Init(ref args)) => init::execute(args),
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
        "\n  consul-ingress v{version} \u{2014} Caddy ingress for Consul\n\n  \
         No command provided. To get started:\n\n    \
         consul-ingress run                     Watch Consul and configure Caddy\n    \
         consul-ingress render                  Print the Caddyfile for the current registry\n    \
         consul-ingress init                    Write the built-in template to route.tmpl\n    \
         consul-ingress --help                  See all commands and options\n"
    );
}
