use crate::apply::ActivityRecorder;
use crate::key_index::unpack_key_index;
use crate::storage::address::{AddressRecord, insert_address_record};
use crate::types::{Outpoint, Receiver, Tx, Utxo};
use chrono::{DateTime, TimeZone, Utc};
use ledger_util::TxHash;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const LOAD_PROGRESS_INTERVAL: usize = 1_000_000;

/// The persisted set of unspent outputs. All mutation goes through
/// `save_reservations` or `apply_tx`; the `(txid, idx)` primary key
/// is the sole unit of contention.
pub struct UtxoStorage {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl UtxoStorage {
    pub fn new(data_dir: &Path) -> Result<Self, String> {
        let db_path = data_dir.join(ledger_util::UTXO_DB_FILE);

        let conn = Connection::open(&db_path).map_err(|e| {
            let msg = format!("Failed to open utxo database at {:?}: {}", db_path, e);
            error!("{}", msg);
            msg
        })?;

        let storage = Self {
            db_path,
            conn: Mutex::new(conn),
        };
        storage.init_db()?;

        Ok(storage)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_db(&self) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS utxos (
                txid TEXT NOT NULL,
                idx INTEGER NOT NULL,
                asset_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                account_id TEXT NOT NULL DEFAULT '',
                manager_node_id TEXT NOT NULL DEFAULT '',
                addr_index INTEGER NOT NULL DEFAULT 0,
                is_change INTEGER NOT NULL DEFAULT 0,
                addr TEXT NOT NULL DEFAULT '',
                reserved_until INTEGER,
                PRIMARY KEY (txid, idx)
            );

            CREATE INDEX IF NOT EXISTS idx_utxos_account_asset
            ON utxos (account_id, asset_id);

            -- Owned by the address issuance service; read-only here.
            CREATE TABLE IF NOT EXISTS addresses (
                address TEXT NOT NULL PRIMARY KEY,
                account_id TEXT NOT NULL,
                manager_node_id TEXT NOT NULL,
                key_index INTEGER NOT NULL,
                is_change INTEGER NOT NULL DEFAULT 0
            );
            ",
        )
        .map_err(|e| {
            let msg = format!("Failed to initialize utxo database: {}", e);
            error!("{}", msg);
            msg
        })?;

        Ok(())
    }

    // Loads every unspent output the account holds for the asset. A
    // busy account can run to millions of rows, so progress is logged
    // each million.
    pub fn load_utxos(&self, account_id: &str, asset_id: &str) -> Result<Vec<Utxo>, String> {
        info!(
            "loading full utxo set for account {} asset {}",
            account_id, asset_id
        );
        let start = Instant::now();

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "
            SELECT amount, reserved_until, txid, idx, manager_node_id, addr_index, is_change, addr
            FROM utxos
            WHERE account_id = ?1 AND asset_id = ?2
            ",
            )
            .map_err(|e| {
                let msg = format!("Failed to prepare utxo load statement: {}", e);
                error!("{}", msg);
                msg
            })?;

        let mut rows = stmt
            .query(rusqlite::params![account_id, asset_id])
            .map_err(|e| {
                let msg = format!("Failed to query utxos: {}", e);
                error!("{}", msg);
                msg
            })?;

        let mut utxos = Vec::new();
        while let Some(row) = rows.next().map_err(|e| {
            let msg = format!("Failed to fetch utxo row: {}", e);
            error!("{}", msg);
            msg
        })? {
            utxos.push(Self::row_to_utxo(account_id, asset_id, row)?);
            if utxos.len() % LOAD_PROGRESS_INTERVAL == 0 {
                info!("loaded {} utxos so far", utxos.len());
            }
        }

        info!("loaded {} utxos done ({:?})", utxos.len(), start.elapsed());
        Ok(utxos)
    }

    fn row_to_utxo(
        account_id: &str,
        asset_id: &str,
        row: &rusqlite::Row<'_>,
    ) -> Result<Utxo, String> {
        let amount = row.get::<_, i64>(0).map_err(|e| {
            let msg = format!("Failed to get amount from utxo row: {}", e);
            error!("{}", msg);
            msg
        })? as u64;

        let reserved_until = row.get::<_, Option<i64>>(1).map_err(|e| {
            let msg = format!("Failed to get reserved_until from utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;

        let txid: String = row.get(2).map_err(|e| {
            let msg = format!("Failed to get txid from utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;

        let index = row.get::<_, i64>(3).map_err(|e| {
            let msg = format!("Failed to get idx from utxo row: {}", e);
            error!("{}", msg);
            msg
        })? as u32;

        let manager_node_id: String = row.get(4).map_err(|e| {
            let msg = format!("Failed to get manager_node_id from utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;

        let addr_index: i64 = row.get(5).map_err(|e| {
            let msg = format!("Failed to get addr_index from utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;

        let is_change: bool = row.get(6).map_err(|e| {
            let msg = format!("Failed to get is_change from utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;

        let addr: String = row.get(7).map_err(|e| {
            let msg = format!("Failed to get addr from utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;

        let hash = TxHash::from_str(&txid).map_err(|e| {
            let msg = format!("Invalid txid in utxo row: {}", e);
            error!("{}", msg);
            msg
        })?;

        let (a, b) = unpack_key_index(addr_index);

        Ok(Utxo {
            outpoint: Outpoint { hash, index },
            asset_id: asset_id.to_string(),
            account_id: account_id.to_string(),
            manager_node_id,
            amount,
            reserved_until: reserved_until.map(timestamp_from_secs).transpose()?,
            addr_index: [a, b],
            is_change,
            addr,
        })
    }

    // Stamps the reservation expiry on each listed outpoint. Rows no
    // longer present match nothing and are skipped; the caller may be
    // re-confirming a reservation while another party spends the
    // output. Expired stamps lapse by wall-clock comparison; there is
    // no release step.
    pub fn save_reservations(&self, utxos: &[Utxo], expires: DateTime<Utc>) -> Result<(), String> {
        let mut conn = self.conn.lock().unwrap();
        let dbtx = conn.transaction().map_err(|e| {
            let msg = format!("Failed to start reservation transaction: {}", e);
            error!("{}", msg);
            msg
        })?;

        {
            let mut stmt = dbtx
                .prepare("UPDATE utxos SET reserved_until = ?1 WHERE txid = ?2 AND idx = ?3")
                .map_err(|e| {
                    let msg = format!("Failed to prepare reservation statement: {}", e);
                    error!("{}", msg);
                    msg
                })?;

            for utxo in utxos {
                stmt.execute(rusqlite::params![
                    expires.timestamp(),
                    utxo.outpoint.hash.to_string(),
                    utxo.outpoint.index as i64,
                ])
                .map_err(|e| {
                    let msg = format!(
                        "Failed to update reservation for {}: {}",
                        utxo.outpoint, e
                    );
                    error!("{}", msg);
                    msg
                })?;
            }
        }

        dbtx.commit().map_err(|e| {
            let msg = format!("Failed to commit reservation transaction: {}", e);
            error!("{}", msg);
            msg
        })
    }

    // Applies the effects of a confirmed transaction. This wrapper
    // opens the database transaction the applier requires and commits
    // it on success; any failure rolls the whole thing back on drop.
    pub fn apply_tx(
        &self,
        recorder: &dyn ActivityRecorder,
        tx: &Tx,
        receivers: &[Option<Receiver>],
    ) -> Result<(Vec<Utxo>, Vec<Utxo>), String> {
        let mut conn = self.conn.lock().unwrap();
        let dbtx = conn.transaction().map_err(|e| {
            let msg = format!("Failed to start apply transaction: {}", e);
            error!("{}", msg);
            msg
        })?;

        let result = crate::apply::apply_tx(&dbtx, recorder, tx, receivers)?;

        dbtx.commit().map_err(|e| {
            let msg = format!("Failed to commit apply transaction: {}", e);
            error!("{}", msg);
            msg
        })?;

        Ok(result)
    }

    // Seeding entry for the address issuance collaborator and tests;
    // the engine itself never writes the addresses table.
    pub fn register_address(&self, record: &AddressRecord) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        insert_address_record(&conn, record)
    }
}

// Reservation timestamps are persisted as unix seconds and surfaced
// in UTC so expiry comparisons are well defined across callers.
fn timestamp_from_secs(secs: i64) -> Result<DateTime<Utc>, String> {
    Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
        let msg = format!("Invalid reserved_until timestamp in utxo row: {}", secs);
        error!("{}", msg);
        msg
    })
}

pub type UtxoStorageRef = Arc<UtxoStorage>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::NullActivityRecorder;
    use crate::script::pay_to_addr_script;
    use crate::types::{TxOutput};
    use chrono::Duration;
    use std::fs;

    fn test_storage(name: &str) -> UtxoStorage {
        let tmp_dir = std::env::temp_dir().join("utxo-ledger").join(name);
        std::fs::create_dir_all(&tmp_dir).unwrap();

        let db_path = tmp_dir.join(ledger_util::UTXO_DB_FILE);
        if db_path.exists() {
            fs::remove_file(&db_path).unwrap();
        }

        UtxoStorage::new(&tmp_dir).unwrap()
    }

    fn output_for(addr_payload: u8, asset_id: &str, amount: u64) -> TxOutput {
        TxOutput {
            asset_id: asset_id.to_string(),
            amount,
            script: pay_to_addr_script(&hex::encode([addr_payload; 20])).unwrap(),
        }
    }

    fn hint(account_id: &str, manager_node_id: &str) -> Option<Receiver> {
        Some(Receiver {
            account_id: account_id.to_string(),
            manager_node_id: manager_node_id.to_string(),
            addr_index: [0, 1],
            is_change: false,
        })
    }

    fn issuing_tx(storage: &UtxoStorage, hash_byte: u8, n: usize) -> Tx {
        let tx = Tx {
            hash: TxHash::from_bytes([hash_byte; 32]),
            inputs: vec![],
            outputs: (0..n)
                .map(|i| output_for(i as u8 + 1, "gold", 100 * (i as u64 + 1)))
                .collect(),
        };
        let hints: Vec<Option<Receiver>> = (0..n).map(|_| hint("acc1", "mn1")).collect();
        storage
            .apply_tx(&NullActivityRecorder, &tx, &hints)
            .unwrap();
        tx
    }

    #[test]
    fn test_load_utxos() {
        let storage = test_storage("test_load_utxos");
        let tx = issuing_tx(&storage, 1, 3);

        let utxos = storage.load_utxos("acc1", "gold").unwrap();
        assert_eq!(utxos.len(), 3);

        let u = utxos
            .iter()
            .find(|u| u.outpoint == Outpoint { hash: tx.hash, index: 1 })
            .unwrap();
        assert_eq!(u.amount, 200);
        assert_eq!(u.asset_id, "gold");
        assert_eq!(u.account_id, "acc1");
        assert_eq!(u.manager_node_id, "mn1");
        assert_eq!(u.addr_index, [0, 1]);
        assert_eq!(u.addr, hex::encode([2u8; 20]));
        assert!(u.reserved_until.is_none());

        // Unknown account or asset loads nothing
        assert!(storage.load_utxos("acc2", "gold").unwrap().is_empty());
        assert!(storage.load_utxos("acc1", "silver").unwrap().is_empty());
    }

    #[test]
    fn test_reservations_are_set_scoped() {
        let storage = test_storage("test_reservations_are_set_scoped");
        issuing_tx(&storage, 2, 3);

        let utxos = storage.load_utxos("acc1", "gold").unwrap();
        let expires = Utc::now() + Duration::seconds(10);

        // Reserve the first two rows only
        storage.save_reservations(&utxos[..2], expires).unwrap();

        let reloaded = storage.load_utxos("acc1", "gold").unwrap();
        for u in &reloaded {
            let expect = utxos[..2].iter().any(|r| r.outpoint == u.outpoint);
            if expect {
                // Sub-second precision is dropped by the column
                assert_eq!(u.reserved_until.unwrap().timestamp(), expires.timestamp());
            } else {
                assert!(u.reserved_until.is_none());
            }
        }
    }

    #[test]
    fn test_reserving_absent_outpoint_is_noop() {
        let storage = test_storage("test_reserving_absent_outpoint_is_noop");
        issuing_tx(&storage, 3, 1);

        let mut utxos = storage.load_utxos("acc1", "gold").unwrap();
        let mut ghost = utxos[0].clone();
        ghost.outpoint.hash = TxHash::from_bytes([0xee; 32]);
        utxos.push(ghost);

        // The absent outpoint matches nothing; the present one is
        // still stamped.
        let expires = Utc::now() + Duration::seconds(10);
        storage.save_reservations(&utxos, expires).unwrap();

        let reloaded = storage.load_utxos("acc1", "gold").unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded[0].reserved_until.is_some());
    }

    #[test]
    fn test_load_rejects_malformed_txid() {
        let storage = test_storage("test_load_rejects_malformed_txid");

        // Corrupt a row behind the storage's back
        let conn = Connection::open(storage.db_path()).unwrap();
        conn.execute(
            "INSERT INTO utxos (txid, idx, asset_id, amount, account_id, manager_node_id)
             VALUES ('zzzz', 0, 'gold', 10, 'acc1', 'mn1')",
            [],
        )
        .unwrap();

        assert!(storage.load_utxos("acc1", "gold").is_err());
    }

    #[test]
    fn test_expired_reservation_keeps_row() {
        let storage = test_storage("test_expired_reservation_keeps_row");
        issuing_tx(&storage, 4, 1);

        let utxos = storage.load_utxos("acc1", "gold").unwrap();

        // Stamp an expiry already in the past; expiry marks time, it
        // never deletes rows.
        let expires = Utc::now() - Duration::seconds(30);
        storage.save_reservations(&utxos, expires).unwrap();

        let reloaded = storage.load_utxos("acc1", "gold").unwrap();
        assert_eq!(reloaded.len(), 1);
        let reserved_until = reloaded[0].reserved_until.unwrap();
        assert!(reserved_until < Utc::now());
    }
}
