//! Change-marker comparison deciding whether a thread needs re-triage.
//!
//! Markers are opaque provider tokens; only equality is meaningful. The
//! stored side is `ThreadRecord::last_analyzed_change_marker`, written only
//! when a triage run is recorded.

/// True when nothing has been analyzed yet or the thread changed since.
pub fn should_analyze(stored_marker: Option<&str>, observed_marker: &str) -> bool {
    match stored_marker {
        None => true,
        Some(stored) => stored != observed_marker,
    }
}
