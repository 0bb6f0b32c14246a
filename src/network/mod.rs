//! Listeners and outbound peer dialing.
//!
//! The network layer owns sockets and framing only; every parsed line is
//! forwarded to the core task as a [`CoreEvent`]. Connection identity is a
//! monotonically assigned [`ConnId`].

pub mod connection;

use crate::config::LinkBlock;
use crate::ircd::CoreEvent;
use crate::state::ConnId;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, warn};

static NEXT_CONN: AtomicU32 = AtomicU32::new(1);

/// Accept clients forever, handing each socket its own I/O task.
pub async fn run_client_listener(listener: TcpListener, events: UnboundedSender<CoreEvent>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let conn = ConnId(NEXT_CONN.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        if events
            .send(CoreEvent::Accepted {
                conn,
                addr,
                tx,
                queued: queued.clone(),
            })
            .is_err()
        {
            return;
        }
        let events = events.clone();
        tokio::spawn(connection::run_client(stream, conn, events, rx, queued));
    }
}

/// Accept inbound server links.
pub async fn run_peer_listener(listener: TcpListener, events: UnboundedSender<CoreEvent>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "peer accept failed");
                continue;
            }
        };
        info!(%addr, "inbound server link");
        let label = format!("link-{addr}");
        let (tx, rx) = mpsc::unbounded_channel();
        if events
            .send(CoreEvent::PeerUp {
                mesh: 0,
                label: label.clone(),
                description: String::new(),
                tx,
            })
            .is_err()
        {
            return;
        }
        let events = events.clone();
        tokio::spawn(connection::run_peer(stream, label, events, rx));
    }
}

/// Dial a configured link and attach it to its mesh slot.
pub async fn connect_peer(link: LinkBlock, events: UnboundedSender<CoreEvent>) {
    info!(peer = %link.name, address = %link.address, "connecting to peer");
    let stream = match TcpStream::connect(link.address).await {
        Ok(s) => s,
        Err(e) => {
            warn!(peer = %link.name, error = %e, "peer connect failed");
            return;
        }
    };
    let (tx, rx) = mpsc::unbounded_channel();
    if events
        .send(CoreEvent::PeerUp {
            mesh: link.mesh,
            label: link.name.clone(),
            description: link.description.clone(),
            tx,
        })
        .is_err()
    {
        return;
    }
    connection::run_peer(stream, link.name, events, rx).await;
}
