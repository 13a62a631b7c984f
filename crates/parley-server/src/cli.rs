use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "parley-server", about = "Parley realtime chat server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/parley.toml")]
    pub config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}
