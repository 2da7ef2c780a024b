use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod pid;

use logvault::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.get_command();

    // start configures logging from the loaded config
    if !matches!(command, cli::Commands::Start { .. }) {
        init_tracing("warn", "text");
    }

    match command {
        cli::Commands::Start { pid_file } => {
            commands::start::execute(&args.config, pid_file).await?;
        }
        cli::Commands::Stop {
            pid_file,
            force,
            timeout,
        } => {
            commands::stop::execute(pid_file, force, timeout).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Db { action } => match action {
            cli::DbCommands::Stats => commands::db::stats(&args.config).await?,
            cli::DbCommands::Vacuum => commands::db::vacuum(&args.config).await?,
            cli::DbCommands::Clear { yes } => commands::db::clear(&args.config, yes).await?,
        },
        cli::Commands::Version => {
            println!("logvault v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
