// command line interface

use std::path::PathBuf;

use clap::Parser;
use miette::Result;

use crate::Server;
use crate::server::Config;

#[derive(Parser)]
#[command(
    name = "stillmind",
    about = "Meditation app backend - streaming ai coach, sessions, and streaks"
)]
struct Cli {
    /// database connection url, e.g. sqlite:stillmind.db?mode=rwc
    #[arg(long, short, env = "DATABASE_URL")]
    db: Option<String>,

    /// anthropic api key (also read from ANTHROPIC_API_KEY)
    #[arg(long, short = 'k')]
    api_key: Option<String>,

    /// model for coaching replies
    #[arg(long, env = "ANTHROPIC_MODEL")]
    model: Option<String>,

    /// host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// port number
    #[arg(long, short, default_value = "5000")]
    port: u16,

    /// directory holding the built front-end
    #[arg(long, default_value = "public")]
    static_dir: PathBuf,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        db_url: cli.db,
        api_key: cli.api_key,
        model: cli.model,
        host: cli.host,
        port: cli.port,
        static_dir: cli.static_dir,
    };

    Ok(Server::run(config).await?)
}
