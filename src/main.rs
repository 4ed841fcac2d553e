//! Interactive terminal client for the Internet Archive's free audio
//! collections.

use std::sync::Arc;

use anyhow::Result;
use cratedigger::{App, ArchiveClient, Config, Coordinator, Database, DedupStore, torrent_resolver};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    // Frames render on stdout; logs stay on stderr and default to warn so
    // the interactive screen is not interleaved with log lines.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let config = Config::from_env();
    tokio::fs::create_dir_all(config.state_dir()).await?;
    debug!(download_dir = %config.download_dir.display(), "configuration loaded");

    let db = Database::new(&config.db_path()).await?;
    let store = DedupStore::new(db);
    let client = ArchiveClient::new();
    let resolver = torrent_resolver(client.http().clone());
    let coordinator = Coordinator::new(
        client.clone(),
        store,
        Arc::clone(&resolver),
        config.download_dir.clone(),
    );

    // An interrupt restores the terminal and leaves with a clean exit code.
    // Background transfers still in flight are not waited upon.
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = crossterm::terminal::disable_raw_mode();
            println!();
            std::process::exit(0);
        }
    });

    let app = App::new(client, coordinator, resolver, config);
    app.run().await?;

    Ok(())
}
