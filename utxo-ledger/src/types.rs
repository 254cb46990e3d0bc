use chrono::{DateTime, Utc};
use ledger_util::TxHash;
use std::fmt;
use std::str::FromStr;

/// Identifies one output of one transaction. The persisted form is
/// the txid hex string plus the integer output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Outpoint {
    pub hash: TxHash,
    pub index: u32,
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

impl FromStr for Outpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        let (hash, index) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("Invalid outpoint {}: missing index separator", s))?;
        let hash = TxHash::from_str(hash)?;
        let index = index
            .parse::<u32>()
            .map_err(|e| format!("Invalid outpoint index in {}: {}", s, e))?;
        Ok(Self { hash, index })
    }
}

/// One unspent output in the persisted set.
#[derive(Debug, Clone, PartialEq)]
pub struct Utxo {
    pub outpoint: Outpoint,
    pub asset_id: String,
    pub account_id: String,
    pub manager_node_id: String,
    pub amount: u64,
    pub reserved_until: Option<DateTime<Utc>>,
    pub addr_index: [u32; 2],
    pub is_change: bool,
    pub addr: String,
}

impl Utxo {
    // Outputs paying an address this system does not manage keep
    // empty account and manager node fields.
    pub fn is_local(&self) -> bool {
        !self.manager_node_id.is_empty()
    }
}

/// Ownership info the transaction builder already knows for an
/// output, supplied positionally at apply time. Covers change outputs
/// and transfers validated during transaction construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Receiver {
    pub account_id: String,
    pub manager_node_id: String,
    pub addr_index: [u32; 2],
    pub is_change: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxInput {
    pub previous: Outpoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxOutput {
    pub asset_id: String,
    pub amount: u64,
    pub script: Vec<u8>,
}

/// A confirmed transaction. The hash is computed by the construction
/// and signing layer before the transaction reaches this engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Tx {
    pub hash: TxHash,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}
