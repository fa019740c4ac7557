use crate::cli::output::{info, success, warning};
use crate::cli::Session;
use crate::core::config::{default_config, save_config};
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration as TOML
    Show,
}

pub fn run(session: &Session, args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Init { force } => {
            let path = &session.config_path;
            if path.exists() && !force {
                warning(&format!(
                    "{} already exists; pass --force to overwrite",
                    path.display()
                ));
                return Ok(());
            }
            save_config(path, &default_config())?;
            success(&format!("Wrote {}", path.display()));
        }
        ConfigCommands::Show => {
            if !session.json {
                info(&format!("Configuration file: {}", session.config_path.display()));
            }
            let mut config = session.config.clone();
            if config.graph.password.is_some() {
                config.graph.password = Some("********".to_string());
            }
            let rendered = if session.json {
                serde_json::to_string_pretty(&config)?
            } else {
                toml::to_string_pretty(&config)?
            };
            println!("{}", rendered);
        }
    }
    Ok(())
}
