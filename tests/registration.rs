//! Registration flow: the welcome burst, nick collisions, timeouts, and
//! the pre-registration command filter.

mod common;

use common::Harness;

#[test]
fn nick_and_user_produce_the_welcome_burst() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    let burst = h.register(&mut alice, "alice");

    assert!(
        burst[0].starts_with(":irc.test.net 001 alice :Welcome to the TestNet IRC Network alice!"),
        "unexpected first line: {}",
        burst[0]
    );
    for num in ["002", "003", "004", "005"] {
        assert!(
            burst.iter().any(|l| l.contains(&format!(" {num} "))),
            "missing {num} in {burst:?}"
        );
    }
    // No MOTD configured: 422 closes the burst.
    assert!(burst.iter().any(|l| l.contains(" 422 ")));
}

#[test]
fn user_before_nick_also_registers() {
    let mut h = Harness::new();
    let mut bob = h.connect();
    h.line(&bob, "USER bob 0 * :Bob");
    assert!(bob.drain().is_empty(), "no burst before NICK");
    h.line(&bob, "NICK bob");
    let burst = bob.drain();
    assert!(burst.iter().any(|l| l.contains(" 001 bob ")));
}

#[test]
fn folded_nick_collision_yields_433() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "Alice");

    let mut imposter = h.connect();
    h.line(&imposter, "NICK alice");
    let lines = imposter.drain();
    assert_eq!(
        lines,
        vec![":irc.test.net 433 * alice :Nickname is already in use".to_string()]
    );

    // The scandinavian fold catches bracket variants too.
    let mut sneaky = h.connect();
    h.register(&mut sneaky, "n[1]");
    let mut copycat = h.connect();
    h.line(&copycat, "NICK n{1}");
    assert_eq!(copycat.count_containing(" 433 "), 1);
}

#[test]
fn unknown_commands_are_silent_before_registration() {
    let mut h = Harness::new();
    let mut c = h.connect();
    h.line(&c, "WHOIS someone");
    h.line(&c, "BOGUS");
    assert!(c.drain().is_empty());

    h.register(&mut c, "carol");
    c.drain();
    h.line(&c, "BOGUS");
    let lines = c.drain();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 421 carol BOGUS :Unknown command"));

    // Arity shortfalls get 461 with the canonical command name.
    h.line(&c, "JOIN");
    let lines = c.drain();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 461 carol JOIN :Not enough parameters"));
}

#[test]
fn registration_times_out() {
    let mut h = Harness::new();
    let mut c = h.connect();
    h.line(&c, "NICK slowpoke");

    // Age the connection past the configured window, then tick.
    let id = h.ircd.state.user_by_conn(c.conn).unwrap();
    h.ircd.state.users.get_mut(id).unwrap().connected_at -= 120;
    h.tick();

    let lines = c.drain();
    assert!(lines.iter().any(|l| l == "ERROR :Registration timeout"));
    assert!(h.ircd.state.user_by_conn(c.conn).is_none());
    assert!(h.ircd.state.users.by_nick("slowpoke").is_none());
}

#[test]
fn oper_grants_mode_and_indexes() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    alice.drain();

    h.line(&alice, "OPER root wrongpass");
    assert_eq!(alice.count_containing(" 491 "), 1);

    h.line(&alice, "OPER root hunter2");
    let lines = alice.drain();
    assert!(lines.iter().any(|l| l.contains(" 381 ")));
    assert!(lines.iter().any(|l| l.ends_with("MODE alice :+o")));
    let id = h.ircd.state.users.by_nick("alice").unwrap();
    assert_eq!(h.ircd.state.opers, vec![id]);
}

#[test]
fn stats_t_reports_the_connection_counters() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    h.register(&mut alice, "alice");
    alice.drain();
    let _bob = h.connect(); // second accept bumps the totals

    h.line(&alice, "STATS t");
    let lines = alice.drain();
    assert!(lines.iter().any(|l| l.ends_with("accepts: 2")));
    // The resolver boundary is a pass-through: every accept counts one
    // lookup that fell back to the literal address.
    assert!(lines.iter().any(|l| l.ends_with("dns queries: 2")));
    assert!(lines.iter().any(|l| l.ends_with("dns bad: 2")));
    assert!(lines.iter().any(|l| l.ends_with("dns good: 0")));
    assert!(lines.last().unwrap().contains(" 219 "));
}

#[test]
fn quit_removes_the_user_and_notifies_channel_peers() {
    let mut h = Harness::new();
    let mut alice = h.connect();
    let mut bob = h.connect();
    h.register(&mut alice, "alice");
    h.register(&mut bob, "bob");
    h.line(&alice, "JOIN #room");
    h.line(&bob, "JOIN #room");
    alice.drain();
    bob.drain();

    h.line(&alice, "QUIT :gone home");
    let seen: Vec<String> = bob
        .drain()
        .into_iter()
        .filter(|l| l.contains("QUIT"))
        .collect();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with(":alice!~alice@"));
    assert!(seen[0].ends_with("QUIT :gone home"));
    assert!(h.ircd.state.users.by_nick("alice").is_none());
    // WHOWAS remembers her.
    h.line(&bob, "WHOWAS alice");
    assert_eq!(bob.count_containing(" 314 "), 1);
}
