use crate::auth::RefreshState;

/// A lightweight snapshot of runtime "signals".
///
/// This is intentionally *facts only* (no policy). Applications can build
/// loading indicators or logout prompts on top of these signals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalsSnapshot {
    pub in_flight: usize,
    /// Dedup keys of live calls, sorted.
    pub in_flight_keys: Vec<String>,
    pub has_credentials: bool,
    /// `None` when auth refresh is not installed.
    pub refresh_state: Option<RefreshState>,
}
