//! Test harness: drives the dispatch pipeline directly through
//! [`CoreEvent`]s, with per-client taps on the outbound queues.
#![allow(dead_code)] // each test binary uses a different slice of this

use cinderd::config::Config;
use cinderd::ircd::{CoreEvent, Ircd};
use cinderd::state::ConnId;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const BASE_CONFIG: &str = r#"
    [server]
    name = "irc.test.net"
    network = "TestNet"
    description = "a test server"

    [listen]
    client = "127.0.0.1:0"

    [[oper]]
    name = "root"
    password = "hunter2"
"#;

pub fn config(extra: &str) -> Config {
    let raw = format!("{BASE_CONFIG}\n{extra}");
    toml::from_str(&raw).expect("test config parses")
}

pub struct TestClient {
    pub conn: ConnId,
    rx: UnboundedReceiver<String>,
}

impl TestClient {
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            out.push(line);
        }
        out
    }

    pub fn count_containing(&mut self, needle: &str) -> usize {
        self.drain().iter().filter(|l| l.contains(needle)).count()
    }
}

pub struct TestPeer {
    pub label: String,
    pub rx: UnboundedReceiver<String>,
}

impl TestPeer {
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            out.push(line);
        }
        out
    }
}

pub struct Harness {
    pub ircd: Ircd,
    next_conn: u32,
    next_sum: u32,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config(""))
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            ircd: Ircd::new(config),
            next_conn: 1,
            next_sum: 1,
        }
    }

    /// A unique sum for hand-built inbound peer packets.
    pub fn sum(&mut self) -> String {
        let sum = format!("feed{:04x}", self.next_sum);
        self.next_sum += 1;
        sum
    }

    pub fn connect(&mut self) -> TestClient {
        let conn = ConnId(self.next_conn);
        self.next_conn += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.ircd.handle_event(CoreEvent::Accepted {
            conn,
            addr: "127.0.0.1:50000".parse().expect("test addr"),
            tx,
            queued: Arc::default(),
        });
        TestClient { conn, rx }
    }

    pub fn line(&mut self, client: &TestClient, line: &str) {
        self.ircd.handle_event(CoreEvent::Line {
            conn: client.conn,
            line: line.to_string(),
        });
    }

    /// NICK + USER, returning the registration burst.
    pub fn register(&mut self, client: &mut TestClient, nick: &str) -> Vec<String> {
        self.line(client, &format!("NICK {nick}"));
        self.line(client, &format!("USER {nick} 0 * :{nick} realname"));
        client.drain()
    }

    pub fn peer(&mut self, label: &str) -> TestPeer {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        self.ircd.handle_event(CoreEvent::PeerUp {
            mesh: 0,
            label: label.to_string(),
            description: String::new(),
            tx,
        });
        let mut peer = TestPeer {
            label: label.to_string(),
            rx,
        };
        // Complete the handshake: the peer introduces itself back.
        peer.drain();
        let sum = self.sum();
        self.peer_line(&peer, &format!("{sum} SERVER {label} :peer description"));
        peer
    }

    pub fn peer_line(&mut self, peer: &TestPeer, line: &str) {
        self.ircd.handle_event(CoreEvent::PeerLine {
            label: peer.label.clone(),
            line: line.to_string(),
        });
    }

    pub fn tick(&mut self) {
        self.ircd.handle_event(CoreEvent::Tick);
    }
}

pub fn sender_pair() -> (UnboundedSender<String>, UnboundedReceiver<String>) {
    mpsc::unbounded_channel()
}
