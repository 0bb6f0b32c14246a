//! Global daemon counters, updated from the hot paths and read by STATS
//! and LUSERS. All totals are monotonic.

#[derive(Debug, Default, Clone)]
pub struct GlobalStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub accepts: u64,
    pub refused: u64,
    pub unknown_commands: u64,
    pub nick_collisions: u64,
    pub dns_queries: u64,
    pub dns_good: u64,
    pub dns_bad: u64,
    pub connects: u64,
}
