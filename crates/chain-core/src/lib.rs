use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub mod constants;
pub mod sync;

/// Record carried by a block. Variants are distinguished structurally on
/// the wire (the field names are disjoint), so blocks serialize flat.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Payload {
    Identity {
        name: String,
        id: String,
        gender: String,
        dob: String,
        address: String,
    },
    Transaction {
        sender: String,
        receiver: String,
        amount: u64,
    },
}

impl Payload {
    /// Field pairs sorted by key. This is the only representation the hash
    /// ever sees, so a block rebuilt from any serialized form reproduces
    /// the identical digest.
    pub fn canonical_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = match self {
            Payload::Identity {
                name,
                id,
                gender,
                dob,
                address,
            } => vec![
                ("name", name.clone()),
                ("id", id.clone()),
                ("gender", gender.clone()),
                ("dob", dob.clone()),
                ("address", address.clone()),
            ],
            Payload::Transaction {
                sender,
                receiver,
                amount,
            } => vec![
                ("sender", sender.clone()),
                ("receiver", receiver.clone()),
                ("amount", amount.to_string()),
            ],
        };
        fields.sort_by_key(|(key, _)| *key);
        fields
    }

    /// Stored value for `key`, if this variant carries it. `amount` is
    /// rendered in decimal.
    pub fn field(&self, key: &str) -> Option<String> {
        self.canonical_fields()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    #[serde(flatten)]
    pub payload: Payload,
    pub previous_hash: String,
    pub hash: String,
}

impl Block {
    /// Stamps the clock and seals the block with its content hash.
    pub fn new(index: u64, payload: Payload, previous_hash: String) -> Self {
        let mut block = Self {
            index,
            timestamp: unix_now(),
            payload,
            previous_hash,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Re-derives the digest over (index, timestamp, canonical payload
    /// fields, previous_hash). Does not mutate the block; validation
    /// compares the result against the stored `hash`.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_string().as_bytes());
        hasher.update(self.timestamp.to_string().as_bytes());
        for (key, value) in self.payload.canonical_fields() {
            hasher.update(key.as_bytes());
            hasher.update(value.as_bytes());
        }
        hasher.update(self.previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain has no blocks")]
    Empty,
    #[error("local chain failed validation; refusing new appends")]
    InvalidChain,
    #[error("duplicate record: {field} = {value}")]
    DuplicateRecord { field: String, value: String },
}

pub mod chain {
    use super::*;

    /// Ordered block sequence rooted at a genesis sentinel. Grows by
    /// append; shrinks only by wholesale replacement during
    /// reconciliation.
    #[derive(Clone, Debug)]
    pub struct Chain {
        blocks: Vec<Block>,
    }

    impl Default for Chain {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Chain {
        pub fn new() -> Self {
            Self {
                blocks: vec![genesis_block()],
            }
        }

        /// Rebuilds a chain from a peer snapshot without validating it.
        /// The claimed hashes are kept provisionally; run `is_valid`
        /// before trusting the result.
        pub fn from_blocks(blocks: Vec<Block>) -> Self {
            Self { blocks }
        }

        pub fn blocks(&self) -> &[Block] {
            &self.blocks
        }

        pub fn len(&self) -> usize {
            self.blocks.len()
        }

        pub fn is_empty(&self) -> bool {
            self.blocks.is_empty()
        }

        pub fn latest(&self) -> Result<&Block, ChainError> {
            self.blocks.last().ok_or(ChainError::Empty)
        }

        /// Appends a new block linked to the current tip. Refused when the
        /// local chain no longer validates; corruption must be resolved
        /// (e.g. by adopting a peer chain) before appends resume.
        pub fn append(&mut self, payload: Payload) -> Result<Block, ChainError> {
            if !self.is_valid() {
                return Err(ChainError::InvalidChain);
            }
            let tip = self.latest()?;
            let block = Block::new(tip.index + 1, payload, tip.hash.clone());
            self.blocks.push(block.clone());
            Ok(block)
        }

        /// Append with a uniqueness check on one payload field, for record
        /// schemas that require it (one identity per `id`).
        pub fn append_unique(&mut self, payload: Payload, key: &str) -> Result<Block, ChainError> {
            if let Some(value) = payload.field(key) {
                if self.find_by_field(key, &value) {
                    return Err(ChainError::DuplicateRecord {
                        field: key.to_string(),
                        value,
                    });
                }
            }
            self.append(payload)
        }

        /// Single pass over i = 1..len: the recomputed hash must match the
        /// stored one and `previous_hash` must match the predecessor. The
        /// genesis block is only the comparison anchor at i = 1.
        pub fn is_valid(&self) -> bool {
            for i in 1..self.blocks.len() {
                let current = &self.blocks[i];
                let previous = &self.blocks[i - 1];
                if current.compute_hash() != current.hash {
                    return false;
                }
                if current.previous_hash != previous.hash {
                    return false;
                }
            }
            true
        }

        /// Linear scan over non-genesis payloads, case-sensitive exact
        /// match on the stored field.
        pub fn find_by_field(&self, key: &str, value: &str) -> bool {
            self.blocks
                .iter()
                .skip(1)
                .any(|b| b.payload.field(key).as_deref() == Some(value))
        }

        /// Atomic wholesale replacement of the block sequence; the swap
        /// step of reconciliation.
        pub fn replace(&mut self, other: Chain) {
            self.blocks = other.blocks;
        }
    }

    /// Fixed sentinel first block, previous_hash = "0".
    pub fn genesis_block() -> Block {
        Block::new(
            0,
            Payload::Transaction {
                sender: constants::GENESIS_LABEL.to_string(),
                receiver: constants::GENESIS_LABEL.to_string(),
                amount: 0,
            },
            constants::GENESIS_PREVIOUS_HASH.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::chain::{genesis_block, Chain};
    use super::constants::HASH_HEX_SIZE;
    use super::*;

    fn identity(id: &str) -> Payload {
        Payload::Identity {
            name: "Asha Rao".to_string(),
            id: id.to_string(),
            gender: "F".to_string(),
            dob: "1991-04-02".to_string(),
            address: "12 Lake Road".to_string(),
        }
    }

    fn transfer(sender: &str, receiver: &str, amount: u64) -> Payload {
        Payload::Transaction {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
        }
    }

    #[test]
    fn genesis_block_example() {
        let genesis = genesis_block();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.hash, genesis.compute_hash());
        assert_eq!(genesis.hash.len(), HASH_HEX_SIZE);
    }

    #[test]
    fn new_chain_has_only_genesis() {
        let chain = Chain::new();
        assert_eq!(chain.len(), 1);
        assert!(chain.is_valid());
        assert_eq!(chain.latest().unwrap().index, 0);
    }

    #[test]
    fn append_links_to_tip() {
        let mut chain = Chain::new();
        let tip_hash = chain.latest().unwrap().hash.clone();
        let block = chain.append(transfer("Alice", "Bob", 10)).unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, tip_hash);
        assert_eq!(chain.len(), 2);

        let next = chain.append(transfer("Bob", "Charlie", 5)).unwrap();
        assert_eq!(next.index, 2);
        assert_eq!(next.previous_hash, block.hash);
    }

    #[test]
    fn valid_chain_validates() {
        let mut chain = Chain::new();
        chain.append(transfer("Alice", "Bob", 10)).unwrap();
        chain.append(identity("1234-5678")).unwrap();
        chain.append(transfer("Bob", "Charlie", 5)).unwrap();
        assert!(chain.is_valid());
    }

    #[test]
    fn tampered_payload_invalidates() {
        let mut chain = Chain::new();
        chain.append(transfer("Alice", "Bob", 10)).unwrap();
        chain.append(transfer("Bob", "Charlie", 5)).unwrap();

        let mut blocks = chain.blocks().to_vec();
        blocks[1].payload = transfer("Alice", "Mallory", 10);
        let tampered = Chain::from_blocks(blocks);
        assert!(!tampered.is_valid());
    }

    #[test]
    fn tampered_hash_breaks_linkage() {
        let mut chain = Chain::new();
        chain.append(transfer("Alice", "Bob", 10)).unwrap();
        chain.append(transfer("Bob", "Charlie", 5)).unwrap();

        // Recomputing the hash after a mutation repairs the block itself
        // but breaks the link from its successor.
        let mut blocks = chain.blocks().to_vec();
        blocks[1].payload = transfer("Alice", "Mallory", 10);
        blocks[1].hash = blocks[1].compute_hash();
        let tampered = Chain::from_blocks(blocks);
        assert!(!tampered.is_valid());
    }

    #[test]
    fn corrupted_chain_refuses_appends() {
        let mut chain = Chain::new();
        chain.append(transfer("Alice", "Bob", 10)).unwrap();

        let mut blocks = chain.blocks().to_vec();
        blocks[1].payload = transfer("Alice", "Mallory", 10);
        let mut corrupted = Chain::from_blocks(blocks);
        let err = corrupted.append(transfer("Bob", "Charlie", 5)).unwrap_err();
        assert_eq!(err, ChainError::InvalidChain);
        assert_eq!(corrupted.len(), 2);
    }

    #[test]
    fn duplicate_identity_rejected() {
        let mut chain = Chain::new();
        chain.append_unique(identity("1234-5678"), "id").unwrap();
        let err = chain.append_unique(identity("1234-5678"), "id").unwrap_err();
        assert_eq!(
            err,
            ChainError::DuplicateRecord {
                field: "id".to_string(),
                value: "1234-5678".to_string(),
            }
        );
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn distinct_identities_accepted() {
        let mut chain = Chain::new();
        chain.append_unique(identity("1234-5678"), "id").unwrap();
        chain.append_unique(identity("8765-4321"), "id").unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain.is_valid());
    }

    #[test]
    fn find_by_field_skips_genesis() {
        let chain = Chain::new();
        // The genesis sentinel carries sender = "Genesis" but is not a record.
        assert!(!chain.find_by_field("sender", "Genesis"));
    }

    #[test]
    fn find_by_field_exact_match() {
        let mut chain = Chain::new();
        chain.append(identity("1234-5678")).unwrap();
        assert!(chain.find_by_field("id", "1234-5678"));
        assert!(!chain.find_by_field("id", "1234-567"));
        assert!(!chain.find_by_field("id", "1234-5678 "));
        assert!(!chain.find_by_field("name", "asha rao"));
        assert!(chain.find_by_field("name", "Asha Rao"));
    }

    #[test]
    fn canonical_fields_sorted_by_key() {
        let tx = transfer("Alice", "Bob", 10);
        let keys: Vec<&str> = tx.canonical_fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["amount", "receiver", "sender"]);

        let id = identity("1234-5678");
        let keys: Vec<&str> = id.canonical_fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["address", "dob", "gender", "id", "name"]);
    }

    #[test]
    fn payload_field_lookup() {
        let tx = transfer("Alice", "Bob", 10);
        assert_eq!(tx.field("sender").as_deref(), Some("Alice"));
        assert_eq!(tx.field("amount").as_deref(), Some("10"));
        assert_eq!(tx.field("dob"), None);
    }

    #[test]
    fn block_serializes_flat() {
        let block = Block::new(1, transfer("Alice", "Bob", 10), "0".repeat(64));
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["index"], 1);
        assert_eq!(value["sender"], "Alice");
        assert_eq!(value["receiver"], "Bob");
        assert_eq!(value["amount"], 10);
        assert_eq!(value["hash"], block.hash.as_str());
        // No nesting under a "payload" key.
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn block_round_trip_preserves_hash() {
        let block = Block::new(3, identity("1234-5678"), "ab".repeat(32));
        let json = serde_json::to_string(&block).unwrap();
        let rebuilt: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(rebuilt, block);
        assert_eq!(rebuilt.compute_hash(), block.hash);
    }

    #[test]
    fn transaction_round_trip_preserves_hash() {
        let block = Block::new(1, transfer("Alice", "Bob", 10), "0".to_string());
        let json = serde_json::to_string(&block).unwrap();
        let rebuilt: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(rebuilt.payload, block.payload);
        assert_eq!(rebuilt.compute_hash(), block.hash);
    }

    #[test]
    fn compute_hash_is_deterministic() {
        let block = Block::new(1, transfer("Alice", "Bob", 10), "0".to_string());
        assert_eq!(block.compute_hash(), block.compute_hash());
        assert_eq!(block.compute_hash(), block.hash);
    }

    #[test]
    fn hash_covers_every_field() {
        let base = Block::new(1, transfer("Alice", "Bob", 10), "0".to_string());

        let mut b = base.clone();
        b.index = 2;
        assert_ne!(b.compute_hash(), base.hash);

        let mut b = base.clone();
        b.timestamp += 1;
        assert_ne!(b.compute_hash(), base.hash);

        let mut b = base.clone();
        b.payload = transfer("Alice", "Bob", 11);
        assert_ne!(b.compute_hash(), base.hash);

        let mut b = base.clone();
        b.previous_hash = "1".to_string();
        assert_ne!(b.compute_hash(), base.hash);
    }

    #[test]
    fn replace_swaps_block_sequence() {
        let mut local = Chain::new();
        let mut other = Chain::new();
        other.append(transfer("Alice", "Bob", 10)).unwrap();
        other.append(transfer("Bob", "Charlie", 5)).unwrap();

        local.replace(other.clone());
        assert_eq!(local.len(), 3);
        assert_eq!(
            local.latest().unwrap().hash,
            other.latest().unwrap().hash
        );
    }
}
