use clap::Parser;
use votebox::cli::{self, Cli, Command};
use votebox::{config, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = config::load_config()?;
    logging::init_logging(&config.logging)?;

    match cli.command {
        Command::Replay { file } => cli::handle_replay(&file, &config).await,
        Command::Serve => cli::handle_serve(&config).await,
        Command::Config => cli::handle_config_show(&config),
        Command::Version => {
            cli::handle_version();
            Ok(())
        }
    }
}
