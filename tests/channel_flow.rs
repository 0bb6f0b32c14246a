//! Channel lifecycle driven over the wire: creation, modes, kicks,
//! topic, invites, and the fanout dedup guarantees.

mod common;

use common::Harness;

#[test]
fn first_join_creates_channel_with_founder_op_and_default_modes() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    alice.drain();

    h.line(&alice, "JOIN #chan");
    let lines = alice.drain();
    assert!(lines[0].starts_with(":alice!~alice@"));
    assert!(lines[0].ends_with("JOIN :#chan"));
    assert_eq!(lines[1], ":irc.test.net MODE #chan +nt");
    assert!(lines.iter().any(|l| l.contains(" 353 alice = #chan :@alice")));
    assert!(lines.iter().any(|l| l.contains(" 366 alice #chan ")));

    h.line(&alice, "MODE #chan");
    let lines = alice.drain();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 324 alice #chan +nt"));
}

#[test]
fn last_part_destroys_the_channel_immediately() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    h.line(&alice, "JOIN #brief");
    alice.drain();

    h.line(&alice, "PART #brief");
    assert!(h.ircd.state.channels.by_name("#brief").is_none());

    // A rejoin recreates from scratch: fresh founder status, fresh modes.
    h.line(&alice, "JOIN #brief");
    alice.drain();
    let chan = h.ircd.state.channels.by_name("#brief").unwrap();
    let id = h.ircd.state.users.by_nick("alice").unwrap();
    let status = h.ircd.state.channels.get(chan).unwrap().member_status(id).unwrap();
    assert!(status.founder && status.op);
}

#[test]
fn channel_mode_changes_fan_out_and_render_back() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    let mut bob = h.connect();
    h.register(&mut alice, "alice");
    h.register(&mut bob, "bob");
    h.line(&alice, "JOIN #modes");
    h.line(&bob, "JOIN #modes");
    alice.drain();
    bob.drain();

    h.line(&alice, "MODE #modes +mk sekrit");
    let seen = bob.drain();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].ends_with("MODE #modes +mk sekrit"));

    h.line(&alice, "MODE #modes +v bob");
    assert!(bob.drain()[0].ends_with("MODE #modes +v bob"));
    alice.drain();

    h.line(&alice, "MODE #modes");
    let reply = alice.drain();
    assert!(reply[0].contains(" 324 alice #modes +ntkm sekrit"));

    // Non-ops cannot set modes.
    h.line(&bob, "MODE #modes -m");
    assert_eq!(bob.count_containing(" 482 "), 1);
}

#[test]
fn full_ban_list_reports_478_and_stops_growing() {
    let mut h = Harness::with_config(common::config(
        r##"
        [[banlist]]
        chan = "#cramped"
        limit = 2
    "##,
    ));
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    h.line(&alice, "JOIN #cramped");
    alice.drain();

    h.line(&alice, "MODE #cramped +b one!*@*");
    h.line(&alice, "MODE #cramped +b two!*@*");
    let lines = alice.drain();
    assert_eq!(
        lines.iter().filter(|l| l.contains("MODE #cramped +b")).count(),
        2
    );

    h.line(&alice, "MODE #cramped +b three!*@*");
    let lines = alice.drain();
    assert_eq!(
        lines,
        vec![":irc.test.net 478 alice #cramped b :Channel ban list is full".to_string()]
    );
    let chan = h.ircd.state.channels.by_name("#cramped").unwrap();
    assert_eq!(h.ircd.state.channels.get(chan).unwrap().bans.len(), 2);

    // Removing an entry frees a slot again.
    h.line(&alice, "MODE #cramped -b one!*@*");
    h.line(&alice, "MODE #cramped +b three!*@*");
    let lines = alice.drain();
    assert!(lines.iter().any(|l| l.ends_with("MODE #cramped -b one!*@*")));
    assert!(lines.iter().any(|l| l.ends_with("MODE #cramped +b three!*@*")));
}

#[test]
fn moderated_channel_silences_the_voiceless() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    let mut bob = h.connect();
    h.register(&mut alice, "alice");
    h.register(&mut bob, "bob");
    h.line(&alice, "JOIN #quiet");
    h.line(&bob, "JOIN #quiet");
    h.line(&alice, "MODE #quiet +m");
    alice.drain();
    bob.drain();

    h.line(&bob, "PRIVMSG #quiet :can anyone hear me");
    assert_eq!(bob.count_containing(" 404 "), 1);
    assert!(alice.drain().is_empty());

    h.line(&alice, "MODE #quiet +v bob");
    bob.drain();
    h.line(&bob, "PRIVMSG #quiet :now?");
    let heard = alice.drain();
    assert!(heard.iter().any(|l| l.ends_with("PRIVMSG #quiet :now?")));
}

#[test]
fn kick_requires_ops_and_removes_the_member() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    let mut bob = h.connect();
    h.register(&mut alice, "alice");
    h.register(&mut bob, "bob");
    h.line(&alice, "JOIN #order");
    h.line(&bob, "JOIN #order");
    alice.drain();
    bob.drain();

    h.line(&bob, "KICK #order alice :mutiny");
    assert_eq!(bob.count_containing(" 482 "), 1);

    h.line(&alice, "KICK #order bob :settled");
    let seen = bob.drain();
    assert!(seen.iter().any(|l| l.ends_with("KICK #order bob :settled")));
    let chan = h.ircd.state.channels.by_name("#order").unwrap();
    let bob_id = h.ircd.state.users.by_nick("bob").unwrap();
    assert!(!h.ircd.state.channels.get(chan).unwrap().is_member(bob_id));
}

#[test]
fn topic_lock_is_enforced_and_topic_is_replayed_on_join() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    let mut bob = h.connect();
    h.register(&mut alice, "alice");
    h.register(&mut bob, "bob");
    h.line(&alice, "JOIN #talk");
    h.line(&bob, "JOIN #talk");
    alice.drain();
    bob.drain();

    // +t is on by default; bob is not an op.
    h.line(&bob, "TOPIC #talk :bob was here");
    assert_eq!(bob.count_containing(" 482 "), 1);

    h.line(&alice, "TOPIC #talk :welcome to #talk");
    assert!(bob.drain().iter().any(|l| l.ends_with("TOPIC #talk :welcome to #talk")));

    let mut carol = h.connect();
    h.register(&mut carol, "carol");
    h.line(&carol, "JOIN #talk");
    let burst = carol.drain();
    assert!(burst.iter().any(|l| l.contains(" 332 carol #talk :welcome to #talk")));
    assert!(burst.iter().any(|l| l.contains(" 333 carol #talk alice ")));
}

#[test]
fn invite_only_channels_honor_invitations() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    let mut bob = h.connect();
    h.register(&mut alice, "alice");
    h.register(&mut bob, "bob");
    h.line(&alice, "JOIN #club");
    h.line(&alice, "MODE #club +i");
    alice.drain();

    h.line(&bob, "JOIN #club");
    assert_eq!(bob.count_containing(" 473 "), 1);

    h.line(&alice, "INVITE bob #club");
    assert_eq!(alice.count_containing(" 341 "), 1);
    let invite: Vec<String> = bob.drain();
    assert!(invite.iter().any(|l| l.ends_with("INVITE bob :#club")));

    h.line(&bob, "JOIN #club");
    let joined = bob.drain();
    assert!(joined.iter().any(|l| l.ends_with("JOIN :#club")));
}

#[test]
fn nick_change_reaches_every_sharer_exactly_once() {
    let mut h = Harness::new();
    let mut a = h.connect();
    let mut b = h.connect();
    let mut c = h.connect();
    h.register(&mut a, "a");
    h.register(&mut b, "b");
    h.register(&mut c, "c");
    for chan in ["#x", "#y"] {
        h.line(&a, &format!("JOIN {chan}"));
        h.line(&b, &format!("JOIN {chan}"));
        h.line(&c, &format!("JOIN {chan}"));
    }
    a.drain();
    b.drain();
    c.drain();

    h.line(&a, "NICK alicia");
    for client in [&mut a, &mut b, &mut c] {
        let seen: Vec<String> = client
            .drain()
            .into_iter()
            .filter(|l| l.contains("NICK :alicia"))
            .collect();
        assert_eq!(seen.len(), 1, "expected exactly one copy");
        assert!(seen[0].starts_with(":a!~a@"));
    }
    assert!(h.ircd.state.users.by_nick("alicia").is_some());
    assert!(h.ircd.state.users.by_nick("a").is_none());
}

#[test]
fn nick_change_while_alone_still_echoes_once() {
    let mut h = Harness::new();
    let mut loner = h.connect();
    h.register(&mut loner, "loner");
    loner.drain();
    h.line(&loner, "NICK hermit");
    let seen = loner.drain();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].ends_with("NICK :hermit"));
}

#[test]
fn membership_graph_stays_bidirectional() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    let mut bob = h.connect();
    h.register(&mut alice, "alice");
    h.register(&mut bob, "bob");
    for chan in ["#one", "#two", "#three"] {
        h.line(&alice, &format!("JOIN {chan}"));
        h.line(&bob, &format!("JOIN {chan}"));
    }
    h.line(&bob, "PART #two");

    for user in h.ircd.state.users.ids() {
        let memberships = h.ircd.state.users.get(user).unwrap().memberships.clone();
        for m in memberships {
            let chan = h.ircd.state.channels.get(m.channel).unwrap();
            assert!(chan.is_member(user), "edge missing on channel side");
        }
    }
    for chan in h.ircd.state.channels.ids() {
        let members = h.ircd.state.channels.get(chan).unwrap().members.clone();
        assert!(!members.is_empty(), "empty channel survived");
        for (user, _) in members {
            let u = h.ircd.state.users.get(user).unwrap();
            assert!(u.membership(chan).is_some(), "edge missing on user side");
        }
    }
}
