//! Network bans: the K/G/Z/Q/E-line family and hostmask matching.
//!
//! All lines live in memory only. K and G lines match `ident@host`,
//! Z-lines match the raw IP, Q-lines forbid nick patterns, and E-lines
//! exempt matching `ident@host` masks from the other three.

use cinder_proto::fold_char;

/// Wildcard hostmask match: `*` spans any run, `?` one character,
/// compared under the IRC fold.
pub fn match_mask(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().map(fold_char).collect();
    let t: Vec<char> = text.chars().map(fold_char).collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star: Option<usize> = None;
    let mut mark = 0;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// The five x-line kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XLineKind {
    /// Local ident@host ban.
    K,
    /// Network-wide ident@host ban.
    G,
    /// IP ban.
    Z,
    /// Forbidden nick pattern.
    Q,
    /// Exemption from K/G/Z.
    E,
}

impl XLineKind {
    pub fn letter(self) -> char {
        match self {
            Self::K => 'K',
            Self::G => 'G',
            Self::Z => 'Z',
            Self::Q => 'Q',
            Self::E => 'E',
        }
    }

    pub fn from_command(cmd: &str) -> Option<Self> {
        match cmd {
            "KLINE" => Some(Self::K),
            "GLINE" => Some(Self::G),
            "ZLINE" => Some(Self::Z),
            "QLINE" => Some(Self::Q),
            "ELINE" => Some(Self::E),
            _ => None,
        }
    }
}

/// One ban entry.
#[derive(Debug, Clone)]
pub struct XLine {
    pub mask: String,
    pub set_by: String,
    pub set_at: i64,
    /// Seconds of validity; 0 means permanent.
    pub duration: u64,
    pub reason: String,
}

impl XLine {
    fn expired(&self, now: i64) -> bool {
        self.duration != 0 && now >= self.set_at + self.duration as i64
    }
}

/// All active x-lines.
#[derive(Debug, Default)]
pub struct XLines {
    klines: Vec<XLine>,
    glines: Vec<XLine>,
    zlines: Vec<XLine>,
    qlines: Vec<XLine>,
    elines: Vec<XLine>,
}

impl XLines {
    fn list(&self, kind: XLineKind) -> &Vec<XLine> {
        match kind {
            XLineKind::K => &self.klines,
            XLineKind::G => &self.glines,
            XLineKind::Z => &self.zlines,
            XLineKind::Q => &self.qlines,
            XLineKind::E => &self.elines,
        }
    }

    fn list_mut(&mut self, kind: XLineKind) -> &mut Vec<XLine> {
        match kind {
            XLineKind::K => &mut self.klines,
            XLineKind::G => &mut self.glines,
            XLineKind::Z => &mut self.zlines,
            XLineKind::Q => &mut self.qlines,
            XLineKind::E => &mut self.elines,
        }
    }

    /// Add a line; duplicate masks within a kind are rejected.
    pub fn add(&mut self, kind: XLineKind, line: XLine) -> bool {
        let list = self.list_mut(kind);
        if list.iter().any(|l| l.mask == line.mask) {
            return false;
        }
        list.push(line);
        true
    }

    /// Remove a line by exact mask.
    pub fn remove(&mut self, kind: XLineKind, mask: &str) -> bool {
        let list = self.list_mut(kind);
        let before = list.len();
        list.retain(|l| l.mask != mask);
        list.len() != before
    }

    pub fn entries(&self, kind: XLineKind) -> &[XLine] {
        self.list(kind)
    }

    /// Drop lines whose duration has lapsed.
    pub fn expire(&mut self, now: i64) {
        for kind in [XLineKind::K, XLineKind::G, XLineKind::Z, XLineKind::Q, XLineKind::E] {
            self.list_mut(kind).retain(|l| !l.expired(now));
        }
    }

    /// Check a registering connection. Returns the matching ban, unless an
    /// E-line exempts the `ident@host`.
    pub fn check_connection(&self, ident: &str, host: &str, ip: &str) -> Option<(XLineKind, &XLine)> {
        let id_host = format!("{ident}@{host}");
        if self.elines.iter().any(|e| match_mask(&e.mask, &id_host)) {
            return None;
        }
        for line in &self.klines {
            if match_mask(&line.mask, &id_host) {
                return Some((XLineKind::K, line));
            }
        }
        for line in &self.glines {
            if match_mask(&line.mask, &id_host) {
                return Some((XLineKind::G, line));
            }
        }
        for line in &self.zlines {
            if match_mask(&line.mask, ip) {
                return Some((XLineKind::Z, line));
            }
        }
        None
    }

    /// Check a nickname against Q-lines.
    pub fn check_nick(&self, nick: &str) -> Option<&XLine> {
        self.qlines.iter().find(|l| match_mask(&l.mask, nick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(mask: &str) -> XLine {
        XLine {
            mask: mask.to_string(),
            set_by: "oper".to_string(),
            set_at: 100,
            duration: 0,
            reason: "no reason".to_string(),
        }
    }

    #[test]
    fn mask_wildcards() {
        assert!(match_mask("*!*@*.example.com", "nick!user@box.example.com"));
        assert!(match_mask("bad?user@*", "badXuser@anywhere"));
        assert!(match_mask("*", "anything"));
        assert!(!match_mask("*@example.com", "user@example.org"));
        assert!(match_mask("NICK[1]", "nick{1}")); // folded comparison
    }

    #[test]
    fn duplicate_masks_rejected() {
        let mut x = XLines::default();
        assert!(x.add(XLineKind::K, line("*@evil.net")));
        assert!(!x.add(XLineKind::K, line("*@evil.net")));
        assert!(x.remove(XLineKind::K, "*@evil.net"));
        assert!(!x.remove(XLineKind::K, "*@evil.net"));
    }

    #[test]
    fn eline_exempts_kline() {
        let mut x = XLines::default();
        x.add(XLineKind::K, line("*@*.evil.net"));
        assert!(x.check_connection("u", "box.evil.net", "1.2.3.4").is_some());
        x.add(XLineKind::E, line("u@box.evil.net"));
        assert!(x.check_connection("u", "box.evil.net", "1.2.3.4").is_none());
    }

    #[test]
    fn zline_matches_ip_only() {
        let mut x = XLines::default();
        x.add(XLineKind::Z, line("10.0.0.*"));
        let hit = x.check_connection("u", "clean.host", "10.0.0.7");
        assert!(matches!(hit, Some((XLineKind::Z, _))));
        assert!(x.check_connection("u", "clean.host", "10.1.0.7").is_none());
    }

    #[test]
    fn qline_and_expiry() {
        let mut x = XLines::default();
        let mut q = line("services*");
        q.duration = 60;
        x.add(XLineKind::Q, q);
        assert!(x.check_nick("ServicesBot").is_some());
        x.expire(120);
        assert!(x.check_nick("ServicesBot").is_some());
        x.expire(161);
        assert!(x.check_nick("ServicesBot").is_none());
    }
}
