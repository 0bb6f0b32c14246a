//! Server-to-server behavior: handshake, remote users, propagation with
//! sum-based loop suppression, and collision handling.

mod common;

use common::Harness;

#[test]
fn handshake_records_the_peer_description() {
    let mut h = Harness::new();
    let _hub = h.peer("hub.test.net");
    assert_eq!(
        h.ircd.peers.server_description("hub.test.net"),
        "peer description"
    );
    // Unknown servers fall back to the local description.
    assert_eq!(
        h.ircd.peers.server_description("nowhere.net"),
        "a test server"
    );
}

#[test]
fn privmsg_to_a_shared_channel_emits_one_summed_packet_and_drops_the_echo() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    let mut carol = h.connect();
    h.register(&mut alice, "alice");
    h.register(&mut carol, "carol");
    let mut hub = h.peer("hub.test.net");

    // Remote bob appears and joins the channel the locals share.
    let s = h.sum();
    h.peer_line(&hub, &format!("{s} NICK bob ~bob far.host hub.test.net 100 :Bob"));
    h.line(&alice, "JOIN #x");
    h.line(&carol, "JOIN #x");
    let s = h.sum();
    h.peer_line(&hub, &format!("{s} :bob JOIN #x"));
    alice.drain();
    carol.drain();
    hub.drain();

    h.line(&alice, "PRIVMSG #x :hi");
    let packets = hub.drain();
    assert_eq!(packets.len(), 1, "exactly one outbound packet: {packets:?}");
    let (sum, rest) = packets[0].split_once(' ').unwrap();
    assert_eq!(sum.len(), 8);
    assert_eq!(rest, ":alice PRIVMSG #x :hi");

    // Carol got her one local copy.
    assert_eq!(carol.count_containing("PRIVMSG #x :hi"), 1);

    // The same packet bounced back carries a known sum: dropped whole.
    h.peer_line(&hub, &packets[0]);
    assert_eq!(carol.count_containing("PRIVMSG #x :hi"), 0);
}

#[test]
fn remote_privmsg_is_delivered_to_local_channel_members() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    let mut hub = h.peer("hub.test.net");

    let s = h.sum();
    h.peer_line(&hub, &format!("{s} NICK bob ~bob far.host hub.test.net 100 :Bob"));
    h.line(&alice, "JOIN #x");
    let s = h.sum();
    h.peer_line(&hub, &format!("{s} :bob JOIN #x"));
    alice.drain();

    let s = h.sum();
    h.peer_line(&hub, &format!("{s} :bob PRIVMSG #x :greetings"));
    let seen = alice.drain();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with(":bob!~bob@far.host"));
    assert!(seen[0].ends_with("PRIVMSG #x :greetings"));
}

#[test]
fn wallops_cross_the_mesh_in_both_directions() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    h.line(&alice, "OPER root hunter2");
    h.line(&alice, "MODE alice +w");
    let mut hub = h.peer("hub.test.net");
    alice.drain();
    hub.drain();

    h.line(&alice, "WALLOPS :local warning");
    let packets = hub.drain();
    assert!(packets.iter().any(|p| p.ends_with("@ alice :local warning")));

    let s = h.sum();
    h.peer_line(&hub, &format!("{s} @ remoteop :remote warning"));
    let seen = alice.drain();
    assert!(seen
        .iter()
        .any(|l| l == ":remoteop WALLOPS :remote warning"));
}

#[test]
fn remote_quit_removes_the_remote_user() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    let mut hub = h.peer("hub.test.net");

    let s = h.sum();
    h.peer_line(&hub, &format!("{s} NICK bob ~bob far.host hub.test.net 100 :Bob"));
    h.line(&alice, "JOIN #x");
    let s = h.sum();
    h.peer_line(&hub, &format!("{s} :bob JOIN #x"));
    alice.drain();

    let s = h.sum();
    h.peer_line(&hub, &format!("{s} :bob QUIT :server change"));
    assert!(h.ircd.state.users.by_nick("bob").is_none());
    let chan = h.ircd.state.channels.by_name("#x").unwrap();
    assert_eq!(h.ircd.state.channels.get(chan).unwrap().member_count(), 1);
    let seen = alice.drain();
    assert!(seen.iter().any(|l| l.contains("QUIT :server change")));
}

#[test]
fn nick_collision_prefers_the_earlier_connection() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    let mut hub = h.peer("hub.test.net");
    alice.drain();
    hub.drain();

    // The remote claimant connected at ts=1, long before local alice.
    let s = h.sum();
    h.peer_line(&hub, &format!("{s} NICK alice ~alice far.host hub.test.net 1 :Other Alice"));

    assert_eq!(h.ircd.state.stats.nick_collisions, 1);
    let winner = h.ircd.state.users.by_nick("alice").unwrap();
    assert!(
        !h.ircd.state.users.get(winner).unwrap().is_local(),
        "the earlier (remote) claimant keeps the nick"
    );
    let lines = alice.drain();
    assert!(lines.iter().any(|l| l.contains(" 433 ")));
    assert!(
        lines.iter().any(|l| l.contains("NICK :")),
        "the loser is told their new nick"
    );
}

#[test]
fn squit_marks_the_peer_dead_and_alive_sends_skip_it() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    h.line(&alice, "OPER root hunter2");
    let mut hub = h.peer("hub.test.net");
    alice.drain();
    hub.drain();

    h.line(&alice, "SQUIT hub.test.net");
    assert_eq!(h.ircd.peers.alive_count(), 0);
}
