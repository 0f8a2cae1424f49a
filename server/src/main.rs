use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::hub::Hub;
use server::network::Server;
use std::path::PathBuf;
use std::time::Duration;

/// Bomberman session server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8038")]
    port: u16,
    /// File receiving the history of each finished match
    #[clap(long, env = "BOMBERMAN_MATCH_HISTORY_PATH")]
    history_path: Option<PathBuf>,
    /// Exit after the first match has finished
    #[clap(long)]
    one_shot: bool,
    /// Simulation tick period in milliseconds
    #[clap(short, long, default_value = "200")]
    tick_ms: u64,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig {
            one_shot: self.one_shot,
            ..ServerConfig::default()
        };
        config.game.tick_period = Duration::from_millis(self.tick_ms.max(1));
        config.game.history_path = self.history_path.clone();
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.server_config();
    info!(
        "Starting server (tick {:?}, one-shot: {})",
        config.game.tick_period, config.one_shot
    );

    let hub = Hub::new(config);
    let server = Server::bind(&format!("{}:{}", args.host, args.port), hub.clone()).await?;

    if args.one_shot {
        tokio::select! {
            result = server.run() => result?,
            _ = hub.wait_finished() => info!("Match finished, shutting down"),
        }
    } else {
        server.run().await?;
    }

    Ok(())
}
