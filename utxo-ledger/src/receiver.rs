use crate::script::script_to_addr;
use crate::storage::resolve_from_address_book;
use crate::types::{Outpoint, Receiver, TxOutput, Utxo};
use ledger_util::TxHash;
use rusqlite::Connection;

// Resolves the owner of each newly created output. Three tiers run in
// order:
// 1. Caller hints, for change outputs and transfers the builder
//    already validated.
// 2. The registered addresses table, one batched lookup for every
//    output the hints left unresolved.
// 3. Unknown: whatever is still unresolved belongs to a third party
//    and keeps empty account and manager node fields.
pub fn resolve_receivers(
    conn: &Connection,
    hash: TxHash,
    outputs: &[TxOutput],
    hints: &[Option<Receiver>],
) -> Result<Vec<Utxo>, String> {
    let mut resolved = resolve_from_hints(hash, outputs, hints)?;
    resolve_from_address_book(conn, &mut resolved)?;
    Ok(resolved)
}

/// Hint tier: builds one record per output, taking ownership from the
/// caller's hint where one was supplied. Outputs and hints are paired
/// up front; a length mismatch aborts before anything is resolved.
pub fn resolve_from_hints(
    hash: TxHash,
    outputs: &[TxOutput],
    hints: &[Option<Receiver>],
) -> Result<Vec<Utxo>, String> {
    if outputs.len() != hints.len() {
        let msg = format!(
            "Output count {} does not match receiver hint count {}",
            outputs.len(),
            hints.len()
        );
        error!("{}", msg);
        return Err(msg);
    }

    let mut resolved = Vec::with_capacity(outputs.len());
    for (i, (output, hint)) in outputs.iter().zip(hints.iter()).enumerate() {
        let addr = script_to_addr(&output.script)?;

        let mut utxo = Utxo {
            outpoint: Outpoint {
                hash,
                index: i as u32,
            },
            asset_id: output.asset_id.clone(),
            account_id: String::new(),
            manager_node_id: String::new(),
            amount: output.amount,
            reserved_until: None,
            addr_index: [0, 0],
            is_change: false,
            addr,
        };

        if let Some(rec) = hint {
            utxo.account_id = rec.account_id.clone();
            utxo.manager_node_id = rec.manager_node_id.clone();
            utxo.addr_index = rec.addr_index;
            utxo.is_change = rec.is_change;
        }

        resolved.push(utxo);
    }

    Ok(resolved)
}
