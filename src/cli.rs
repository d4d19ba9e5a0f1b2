use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "trello-relay", version, about = "Trello webhook relay")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: String,

    /// Override the configured number of queue workers.
    #[arg(long, env = "RELAY_WORKERS")]
    pub workers: Option<usize>,
}
