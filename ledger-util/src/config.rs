use super::constants::{LEDGER_CONFIG_FILE, UTXO_LEDGER_SERVICE_NAME};
use super::dirs::get_service_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_reservation_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    // Default reservation lifetime handed to transaction builders
    // that do not pick their own expiry.
    #[serde(default = "default_reservation_secs")]
    pub reservation_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            reservation_secs: default_reservation_secs(),
        }
    }
}

impl LedgerConfig {
    pub fn data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            dir.clone()
        } else {
            get_service_dir(UTXO_LEDGER_SERVICE_NAME).join("data")
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            let msg = format!("Failed to read config file {:?}: {}", path, e);
            error!("{}", msg);
            msg
        })?;

        toml::from_str(&content).map_err(|e| {
            let msg = format!("Failed to parse config file {:?}: {}", path, e);
            error!("{}", msg);
            msg
        })
    }

    // Loads the service config file if present, otherwise defaults.
    pub fn load() -> Result<Self, String> {
        let path = get_service_dir(UTXO_LEDGER_SERVICE_NAME).join(LEDGER_CONFIG_FILE);
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse() {
        let config: LedgerConfig = toml::from_str(
            "
            data_dir = \"/tmp/ledger-test\"
            reservation_secs = 120
            ",
        )
        .unwrap();
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/ledger-test"));
        assert_eq!(config.reservation_secs, 120);

        let config: LedgerConfig = toml::from_str("").unwrap();
        assert_eq!(config.reservation_secs, 60);
        assert!(config.data_dir.is_none());
    }
}
