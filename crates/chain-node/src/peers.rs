use crate::constants::PEER_FETCH_TIMEOUT;
use crate::AppState;
use chain_core::sync::{self, ChainSnapshot, SyncError};
use tracing::{info, warn};

/// Fetches `{peer}/chain` with the per-peer timeout. Transport failures
/// and non-success statuses count as unreachable; an unexpected body
/// counts as malformed. Both are skipped by the caller.
pub async fn fetch_snapshot(
    client: &reqwest::Client,
    peer: &str,
) -> Result<ChainSnapshot, SyncError> {
    let url = format!("{peer}/chain");
    let response = client
        .get(&url)
        .timeout(PEER_FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|err| SyncError::PeerUnreachable(peer.to_string(), err.to_string()))?;
    if !response.status().is_success() {
        return Err(SyncError::PeerUnreachable(
            peer.to_string(),
            format!("status {}", response.status()),
        ));
    }
    response
        .json::<ChainSnapshot>()
        .await
        .map_err(|err| SyncError::MalformedResponse(peer.to_string(), err.to_string()))
}

/// One reconciliation pass. All peer snapshots are fetched before the
/// chain lock is taken; the lock covers only selection and the atomic
/// swap, so appends are never blocked on the network.
pub async fn run_reconciliation(state: &AppState) -> bool {
    let peer_list = state.peers.read().await.peers();
    let mut candidates = Vec::with_capacity(peer_list.len());
    for peer in peer_list {
        match fetch_snapshot(&state.http, &peer).await {
            Ok(snapshot) => candidates.push((peer, snapshot)),
            Err(err) => warn!("reconciliation: {err}"),
        }
    }

    let mut chain = state.chain.write().await;
    let outcome = sync::resolve(&chain, &candidates);
    if let Some(new_chain) = outcome.new_chain {
        chain.replace(new_chain);
        info!("reconciliation adopted a peer chain, new length {}", chain.len());
    }
    outcome.adopted
}
