use crate::chain::Chain;
use crate::Block;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Known peer addresses for one chain instance. Unique, order-irrelevant,
/// mutated only by explicit registration.
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    peers: HashSet<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; returns true when the address was not known before.
    pub fn register(&mut self, address: impl Into<String>) -> bool {
        self.peers.insert(address.into())
    }

    /// Snapshot of the current peer set.
    pub fn peers(&self) -> Vec<String> {
        self.peers.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Wire shape of `GET /chain`: the full ordered block list plus the
/// claimed length.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub length: usize,
    pub chain: Vec<Block>,
}

impl ChainSnapshot {
    pub fn of(chain: &Chain) -> Self {
        Self {
            length: chain.len(),
            chain: chain.blocks().to_vec(),
        }
    }
}

/// Per-peer failures during a reconciliation pass. Logged and skipped,
/// never fatal to the pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("peer {0} unreachable: {1}")]
    PeerUnreachable(String, String),
    #[error("malformed response from peer {0}: {1}")]
    MalformedResponse(String, String),
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub adopted: bool,
    pub new_chain: Option<Chain>,
}

/// Longest-valid-chain selection over already-fetched peer snapshots.
///
/// Strictly greater length is required; an equal-length peer chain never
/// replaces the local one even if it differs in content, so two divergent
/// chains of the same length will not converge through this procedure
/// alone. Candidates are reconstructed from their block lists and must
/// pass `is_valid` before their claimed hashes are trusted. Fetching is
/// the caller's job; this function is deterministic over its inputs and
/// leaves the local chain untouched.
pub fn resolve(local: &Chain, candidates: &[(String, ChainSnapshot)]) -> Outcome {
    let mut best_length = local.len();
    let mut best_chain: Option<Chain> = None;

    for (peer, snapshot) in candidates {
        if snapshot.length != snapshot.chain.len() {
            warn!(
                "peer {} claims length {} but sent {} blocks, skipping",
                peer,
                snapshot.length,
                snapshot.chain.len()
            );
            continue;
        }
        let candidate = Chain::from_blocks(snapshot.chain.clone());
        if candidate.len() <= best_length {
            debug!(
                "peer {} chain length {} <= {}, not a candidate",
                peer,
                candidate.len(),
                best_length
            );
            continue;
        }
        if !candidate.is_valid() {
            warn!(
                "peer {} sent an invalid chain of length {}, skipping",
                peer,
                candidate.len()
            );
            continue;
        }
        best_length = candidate.len();
        best_chain = Some(candidate);
    }

    match best_chain {
        Some(chain) => {
            info!("adopting peer chain of length {}", best_length);
            Outcome {
                adopted: true,
                new_chain: Some(chain),
            }
        }
        None => Outcome {
            adopted: false,
            new_chain: None,
        },
    }
}
