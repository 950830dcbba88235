use std::time::Duration;

/// Bound on each peer `/chain` fetch during a reconciliation pass. A
/// timed-out peer is skipped for that pass, not retried.
pub const PEER_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
