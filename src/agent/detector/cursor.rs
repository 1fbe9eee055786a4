use crate::agent::AgentStatus;

/// Cursor stores session state in SQLite, which the core does not read
/// (Non-goals, spec §1). Always defers to external signals.
pub fn detect() -> Option<AgentStatus> {
    None
}
