//! Renderer config file commands.

use super::common::load_config;
use anyhow::Context;
use audren_config::{RendererConfig, default_config_path, resolve_config_path};
use clap::{Args, Subcommand};
use std::path::Path;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the config file and list every problem
    Validate,

    /// Print the config file path
    Path,
}

pub fn run(args: ConfigArgs, config: Option<&Path>) -> anyhow::Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => {
            match resolve_config_path(config) {
                Some(path) => println!("# {}", path.display()),
                None => println!("# built-in defaults"),
            }
            print!("{}", load_config(config)?.to_toml()?);
        }
        ConfigCommand::Init { force } => {
            let path = config.map_or_else(default_config_path, Path::to_path_buf);
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            RendererConfig::default()
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        ConfigCommand::Validate => {
            let config = load_config(config)?;
            match config.validate() {
                Ok(()) => println!("Config is valid."),
                Err(err) => {
                    println!("Config has {} problem(s):", err.errors.len());
                    for issue in &err.errors {
                        println!("  - {issue}");
                    }
                    anyhow::bail!("invalid config");
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", config.map_or_else(default_config_path, Path::to_path_buf).display());
        }
    }
    Ok(())
}
