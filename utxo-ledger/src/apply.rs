use crate::key_index::pack_key_index;
use crate::receiver::resolve_receivers;
use crate::types::{Outpoint, Receiver, Tx, TxInput, Utxo};
use chrono::{DateTime, Utc};
use ledger_util::TxHash;
use rusqlite::Transaction;
use std::str::FromStr;

/// Sink for balance activity generated by confirmed transactions.
/// Activity describes the view after new outputs land and before
/// spent outputs are removed, so the applier calls it strictly
/// between those two steps.
pub trait ActivityRecorder {
    fn record_activity(
        &self,
        tx: &Tx,
        local_utxos: &[Utxo],
        at: DateTime<Utc>,
    ) -> Result<(), String>;
}

/// Recorder for deployments with no activity consumer.
pub struct NullActivityRecorder;

impl ActivityRecorder for NullActivityRecorder {
    fn record_activity(&self, _tx: &Tx, _local_utxos: &[Utxo], _at: DateTime<Utc>) -> Result<(), String> {
        Ok(())
    }
}

/// Updates the output set to reflect the effects of `tx`: inserts
/// newly created outputs, records activity for the locally managed
/// ones, then deletes the outputs the transaction consumed. Runs
/// entirely inside the caller's open database transaction; on any
/// failure the transaction rolls back on drop and nothing is visible
/// outside it.
///
/// Returns `(deleted, inserted)`. `inserted` holds only the locally
/// owned outputs, mirroring what was sent to the recorder; `deleted`
/// holds every row actually removed, whoever owned it, so callers can
/// reconcile third-party spends too.
pub fn apply_tx(
    dbtx: &Transaction,
    recorder: &dyn ActivityRecorder,
    tx: &Tx,
    receivers: &[Option<Receiver>],
) -> Result<(Vec<Utxo>, Vec<Utxo>), String> {
    let now = Utc::now();

    let resolved = resolve_receivers(dbtx, tx.hash, &tx.outputs, receivers)?;
    insert_utxos(dbtx, &resolved)?;

    let inserted: Vec<Utxo> = resolved.iter().filter(|u| u.is_local()).cloned().collect();

    recorder.record_activity(tx, &inserted, now)?;

    let deleted = delete_utxos(dbtx, &tx.inputs)?;

    Ok((deleted, inserted))
}

fn insert_utxos(dbtx: &Transaction, utxos: &[Utxo]) -> Result<(), String> {
    let mut stmt = dbtx
        .prepare(
            "INSERT INTO utxos (
                txid, idx, asset_id, amount,
                account_id, manager_node_id, addr_index, is_change, addr
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .map_err(|e| {
            let msg = format!("Failed to prepare utxo insert statement: {}", e);
            error!("{}", msg);
            msg
        })?;

    for utxo in utxos {
        stmt.execute(rusqlite::params![
            utxo.outpoint.hash.to_string(),
            utxo.outpoint.index as i64,
            utxo.asset_id,
            utxo.amount as i64,
            utxo.account_id,
            utxo.manager_node_id,
            pack_key_index(utxo.addr_index[0], utxo.addr_index[1]),
            utxo.is_change,
            utxo.addr,
        ])
        .map_err(|e| {
            let msg = format!("Failed to insert utxo {}: {}", utxo.outpoint, e);
            error!("{}", msg);
            msg
        })?;
    }

    Ok(())
}

// Deletes every outpoint the transaction consumed, returning the
// prior record of each row actually removed. Inputs not present in
// the set delete nothing and are not reported.
fn delete_utxos(dbtx: &Transaction, inputs: &[TxInput]) -> Result<Vec<Utxo>, String> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["(?, ?)"; inputs.len()].join(", ");
    let sql = format!(
        "DELETE FROM utxos
         WHERE (txid, idx) IN (VALUES {})
         RETURNING account_id, asset_id, txid, idx",
        placeholders
    );

    let mut params: Vec<rusqlite::types::Value> = Vec::with_capacity(inputs.len() * 2);
    for input in inputs {
        params.push(input.previous.hash.to_string().into());
        params.push((input.previous.index as i64).into());
    }

    let mut stmt = dbtx.prepare(&sql).map_err(|e| {
        let msg = format!("Failed to prepare utxo delete statement: {}", e);
        error!("{}", msg);
        msg
    })?;

    let mut rows = stmt
        .query(rusqlite::params_from_iter(params))
        .map_err(|e| {
            let msg = format!("Failed to delete utxos: {}", e);
            error!("{}", msg);
            msg
        })?;

    let mut deleted = Vec::new();
    while let Some(row) = rows.next().map_err(|e| {
        let msg = format!("Failed to fetch deleted utxo row: {}", e);
        error!("{}", msg);
        msg
    })? {
        let account_id: String = row.get(0).map_err(|e| {
            let msg = format!("Failed to get account_id from deleted utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;
        let asset_id: String = row.get(1).map_err(|e| {
            let msg = format!("Failed to get asset_id from deleted utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;
        let txid: String = row.get(2).map_err(|e| {
            let msg = format!("Failed to get txid from deleted utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;
        let index = row.get::<_, i64>(3).map_err(|e| {
            let msg = format!("Failed to get idx from deleted utxo row: {}", e);
            error!("{}", msg);
            msg
        })? as u32;

        let hash = TxHash::from_str(&txid).map_err(|e| {
            let msg = format!("Invalid txid in deleted utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;

        deleted.push(Utxo {
            outpoint: Outpoint { hash, index },
            asset_id,
            account_id,
            manager_node_id: String::new(),
            amount: 0,
            reserved_until: None,
            addr_index: [0, 0],
            is_change: false,
            addr: String::new(),
        });
    }

    Ok(deleted)
}
