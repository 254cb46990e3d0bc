// Service names
pub const UTXO_LEDGER_SERVICE_NAME: &str = "utxo-ledger";

// Directory constants
pub const LEDGER_ROOT_DIR: &str = ".ledger";

// Database file names
pub const UTXO_DB_FILE: &str = "utxo.sqlite";

// Config file names
pub const LEDGER_CONFIG_FILE: &str = "ledger.toml";
