use anyhow::Result;

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::{cmd_capture, cmd_config, cmd_context, cmd_play, cmd_resolve, cmd_tours, cmd_validate};

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    let output = cli.output;
    match cli.command.clone() {
        Commands::Validate(args) => cmd_validate(args, output).await,
        Commands::Capture(args) => cmd_capture(args, output).await,
        Commands::Context(args) => cmd_context(args, output).await,
        Commands::Resolve(args) => cmd_resolve(args, ctx, output).await,
        Commands::Play(args) => cmd_play(args, ctx, output).await,
        Commands::Tours(args) => cmd_tours(args, ctx, output).await,
        Commands::Config(args) => cmd_config(args, ctx, output).await,
    }
}
