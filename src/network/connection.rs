//! Per-connection I/O tasks.
//!
//! One task per socket: inbound bytes are framed into lines (hard 512-byte
//! cap) and forwarded to the core; outbound lines are drained from the
//! connection's queue, with the queued-bytes counter released as data
//! reaches the socket. When either direction ends, the whole connection
//! does.

use crate::ircd::CoreEvent;
use crate::state::ConnId;
use cinder_proto::MAX_LINE_LEN;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::debug;

/// Drive one client socket until it closes.
pub async fn run_client(
    stream: TcpStream,
    conn: ConnId,
    events: UnboundedSender<CoreEvent>,
    mut outbound: UnboundedReceiver<String>,
    queued: Arc<AtomicUsize>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(MAX_LINE_LEN),
    );

    loop {
        tokio::select! {
            inbound = reader.next() => match inbound {
                Some(Ok(line)) => {
                    if events.send(CoreEvent::Line { conn, line }).is_err() {
                        break;
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    debug!(conn = conn.0, "oversized line, dropping connection");
                    break;
                }
                Some(Err(_)) | None => break,
            },
            line = outbound.recv() => match line {
                Some(mut line) => {
                    let cost = line.len() + 2;
                    line.push_str("\r\n");
                    let result = write_half.write_all(line.as_bytes()).await;
                    queued.fetch_sub(cost, Ordering::Relaxed);
                    if result.is_err() {
                        break;
                    }
                }
                // The core dropped us (quit, flood, refusal).
                None => break,
            },
        }
    }

    let _ = events.send(CoreEvent::Closed { conn });
}

/// Drive one server link until it closes.
pub async fn run_peer(
    stream: TcpStream,
    label: String,
    events: UnboundedSender<CoreEvent>,
    mut outbound: UnboundedReceiver<String>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(MAX_LINE_LEN),
    );

    loop {
        tokio::select! {
            inbound = reader.next() => match inbound {
                Some(Ok(line)) => {
                    let event = CoreEvent::PeerLine {
                        label: label.clone(),
                        line,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Some(Err(_)) | None => break,
            },
            line = outbound.recv() => match line {
                Some(mut line) => {
                    line.push_str("\r\n");
                    if write_half.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    let _ = events.send(CoreEvent::PeerDown { label });
}
