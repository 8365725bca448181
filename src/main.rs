use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hand_tracker::config::Config;
use hand_tracker::pipeline::HandTracker;
use hand_tracker::protocol::ServerMessage;
use hand_tracker::server;
use hand_tracker::worker::{TrackingWorker, WorkerHandle};

const CONFIG_PATH: &str = "hand_tracker.toml";
const OUTPUT_QUEUE: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);

    info!("Hand Tracker ({})", env!("GIT_VERSION"));
    info!(
        listen = %config.server.listen_addr,
        max_hands = config.tracking.hands.max_hands,
        frame_queue = config.server.frame_queue,
        "config: {}",
        config_path
    );

    let tracker = HandTracker::new(config.tracking.clone())?;
    let (out_tx, out_rx) = mpsc::channel::<ServerMessage>(OUTPUT_QUEUE);
    let worker = TrackingWorker::start(tracker, out_tx, config.server.frame_queue)
        .context("failed to start tracking worker")?;

    spawn_console(worker.handle());
    info!("Console: set <section> <key> <value> | reset [slot] | stats");

    let bind_addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .context("invalid listen_addr")?;
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Listening on {}", bind_addr);

    server::serve(listener, worker.handle(), out_rx).await
}

/// Console input: `set <section> <key> <value>`, `reset [slot]`, `stats`
fn spawn_console(worker: WorkerHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            let result = match words.as_slice() {
                [] => continue,
                ["set", section, key, value] => worker.apply_setting(section, key, value),
                ["reset"] => worker.reset_all(),
                ["reset", slot] => match slot.parse::<usize>() {
                    Ok(slot) => worker.reset_slot(slot),
                    Err(_) => {
                        eprintln!("[input] invalid slot: {}", slot);
                        continue;
                    }
                },
                ["stats"] => {
                    info!(dropped_frames = worker.dropped_frames(), "frame queue");
                    continue;
                }
                _ => {
                    eprintln!("[input] usage: set <section> <key> <value> | reset [slot] | stats");
                    continue;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });
}
