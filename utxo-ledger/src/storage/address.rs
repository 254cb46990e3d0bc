use crate::key_index::{pack_key_index, unpack_key_index};
use crate::types::Utxo;
use rusqlite::Connection;

/// A receiving address registered ahead of time by the address
/// issuance service. This engine only reads these records; the insert
/// below exists for the issuance side and for tests.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressRecord {
    pub address: String,
    pub account_id: String,
    pub manager_node_id: String,
    pub addr_index: [u32; 2],
    pub is_change: bool,
}

pub fn insert_address_record(conn: &Connection, record: &AddressRecord) -> Result<(), String> {
    conn.execute(
        "INSERT INTO addresses (address, account_id, manager_node_id, key_index, is_change)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            record.address,
            record.account_id,
            record.manager_node_id,
            pack_key_index(record.addr_index[0], record.addr_index[1]),
            record.is_change,
        ],
    )
    .map_err(|e| {
        let msg = format!("Failed to insert address record {}: {}", record.address, e);
        error!("{}", msg);
        msg
    })?;

    Ok(())
}

/// Registered-address tier: fills in owners for records the hint tier
/// left unresolved, with one batched lookup for the whole batch. Not
/// every address is registered; outputs paying third parties stay
/// unowned.
pub fn resolve_from_address_book(conn: &Connection, utxos: &mut [Utxo]) -> Result<(), String> {
    let addrs: Vec<String> = utxos
        .iter()
        .filter(|u| u.account_id.is_empty())
        .map(|u| u.addr.clone())
        .collect();
    if addrs.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["?"; addrs.len()].join(", ");
    let sql = format!(
        "SELECT address, account_id, manager_node_id, key_index, is_change
         FROM addresses
         WHERE address IN ({})",
        placeholders
    );

    let mut stmt = conn.prepare(&sql).map_err(|e| {
        let msg = format!("Failed to prepare address lookup statement: {}", e);
        error!("{}", msg);
        msg
    })?;

    let mut rows = stmt
        .query(rusqlite::params_from_iter(addrs.iter()))
        .map_err(|e| {
            let msg = format!("Failed to query address records: {}", e);
            error!("{}", msg);
            msg
        })?;

    while let Some(row) = rows.next().map_err(|e| {
        let msg = format!("Failed to fetch address row: {}", e);
        error!("{}", msg);
        msg
    })? {
        let address: String = row.get(0).map_err(|e| {
            let msg = format!("Failed to get address from row: {}", e);
            error!("{}", msg);
            msg
        })?;
        let account_id: String = row.get(1).map_err(|e| {
            let msg = format!("Failed to get account_id from address row: {}", e);
            error!("{}", msg);
            msg
        })?;
        let manager_node_id: String = row.get(2).map_err(|e| {
            let msg = format!("Failed to get manager_node_id from address row: {}", e);
            error!("{}", msg);
            msg
        })?;
        let key_index: i64 = row.get(3).map_err(|e| {
            let msg = format!("Failed to get key_index from address row: {}", e);
            error!("{}", msg);
            msg
        })?;
        let is_change: bool = row.get(4).map_err(|e| {
            let msg = format!("Failed to get is_change from address row: {}", e);
            error!("{}", msg);
            msg
        })?;

        let (a, b) = unpack_key_index(key_index);
        for utxo in utxos.iter_mut() {
            if utxo.account_id.is_empty() && utxo.addr == address {
                utxo.account_id = account_id.clone();
                utxo.manager_node_id = manager_node_id.clone();
                utxo.addr_index = [a, b];
                utxo.is_change = is_change;
            }
        }
    }

    Ok(())
}
