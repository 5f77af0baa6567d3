use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tokio::fs;

use super::context::CliContext;
use super::output::{emit, OutputFormat};
use super::runtime::read_config_file;
use crate::config::Config;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file plus environment overrides)
    Show,

    /// Show one configuration value, e.g. `playback.click_grace_ms`
    Get {
        /// Dotted configuration key
        key: String,
    },

    /// Check that the configuration file parses
    Validate,

    /// Write the default configuration to the config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let path = ctx.config_path();
    match args.action {
        ConfigAction::Show => emit(output, ctx.config(), |config| {
            println!("Current configuration ({}):", path.display());
            match serde_yaml::to_string(config) {
                Ok(yaml) => print!("{yaml}"),
                Err(err) => println!("<unprintable: {err}>"),
            }
        })?,
        ConfigAction::Get { key } => {
            let json = serde_json::to_value(ctx.config())?;
            let value = key
                .split('.')
                .filter(|segment| !segment.is_empty())
                .try_fold(&json, |node, segment| node.get(segment));
            match value {
                Some(value) => emit(output, value, |value| match value {
                    serde_json::Value::String(text) => println!("{text}"),
                    other => println!("{other}"),
                })?,
                None => bail!("{} not found in configuration", key),
            }
        }
        ConfigAction::Validate => {
            if fs::try_exists(path).await? {
                read_config_file(path).await?;
                println!("Configuration file {} is valid", path.display());
            } else {
                println!(
                    "No configuration file at {}; defaults are valid",
                    path.display()
                );
            }
        }
        ConfigAction::Init { force } => {
            if !force && fs::try_exists(path).await? {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(path, serde_yaml::to_string(&Config::default())?)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}
