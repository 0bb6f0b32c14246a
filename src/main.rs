//! cinderd entry point: configuration, listeners, and the core loop.

use cinderd::config::Config;
use cinderd::ircd::{CoreEvent, Ircd, Shutdown};
use cinderd::network;
use std::path::Path;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path; defaults to
/// `cinderd.toml`.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(2);
        }),
        Some(path) => path,
        None => "cinderd.toml".to_string(),
    };

    // Canonicalize so REHASH does not depend on the working directory.
    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() {
    let config_path = resolve_config_path();
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: failed to load config from {config_path}: {e}");
            std::process::exit(2);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!(
        server = %config.server.name,
        network = %config.server.network,
        "Starting cinderd"
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<CoreEvent>();
    let mut ircd = Ircd::new(config.clone());

    // Client listener.
    let client_listener = match TcpListener::bind(config.listen.client).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %config.listen.client, error = %e, "cannot bind client listener");
            std::process::exit(1);
        }
    };
    info!(addr = %config.listen.client, "client listener bound");
    tokio::spawn(network::run_client_listener(
        client_listener,
        events_tx.clone(),
    ));

    // Optional server-to-server listener.
    if let Some(peer_addr) = config.listen.peer {
        match TcpListener::bind(peer_addr).await {
            Ok(l) => {
                info!(addr = %peer_addr, "peer listener bound");
                tokio::spawn(network::run_peer_listener(l, events_tx.clone()));
            }
            Err(e) => {
                error!(addr = %peer_addr, error = %e, "cannot bind peer listener");
                std::process::exit(1);
            }
        }
    }

    // Autoconnect links.
    for link in config.link.iter().filter(|l| l.autoconnect).cloned() {
        tokio::spawn(network::connect_peer(link, events_tx.clone()));
    }

    // One-second housekeeping tick (registration timeouts, line expiry).
    {
        let events = events_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if events.send(CoreEvent::Tick).is_err() {
                    break;
                }
            }
        });
    }

    // Signals: INT/TERM terminate, HUP rehashes.
    {
        let events = events_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
                return;
            };
            let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
                return;
            };
            let Ok(mut sighup) = signal(SignalKind::hangup()) else {
                return;
            };
            loop {
                tokio::select! {
                    _ = sigint.recv() => {
                        info!("SIGINT received");
                        let _ = events.send(CoreEvent::Terminate);
                    }
                    _ = sigterm.recv() => {
                        info!("SIGTERM received");
                        let _ = events.send(CoreEvent::Terminate);
                    }
                    _ = sighup.recv() => {
                        info!("SIGHUP received, rehashing");
                        let _ = events.send(CoreEvent::Rehash);
                    }
                }
            }
        });
    }

    // The core loop: one event at a time, run to completion.
    let shutdown = loop {
        let Some(event) = events_rx.recv().await else {
            break Shutdown::Fatal;
        };
        ircd.handle_event(event);
        for link in ircd.take_pending_connects() {
            tokio::spawn(network::connect_peer(link, events_tx.clone()));
        }
        if let Some(shutdown) = ircd.shutdown {
            break shutdown;
        }
    };

    // Give connection tasks a moment to flush their queues.
    tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;

    match shutdown {
        Shutdown::Die => {
            info!("shutdown complete");
            std::process::exit(0);
        }
        Shutdown::Restart => {
            info!("restarting");
            restart_in_place();
        }
        Shutdown::Fatal => std::process::exit(1),
    }
}

/// Replace this process with a fresh copy of the daemon.
fn restart_in_place() -> ! {
    use std::os::unix::process::CommandExt;
    let exe = std::env::current_exe().unwrap_or_else(|_| "cinderd".into());
    let err = std::process::Command::new(exe)
        .args(std::env::args().skip(1))
        .exec();
    error!(error = %err, "exec failed during restart");
    std::process::exit(1);
}
