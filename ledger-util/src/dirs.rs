use super::constants::LEDGER_ROOT_DIR;

pub fn get_ledger_root_dir() -> std::path::PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(LEDGER_ROOT_DIR)
    } else {
        std::path::PathBuf::from(".").join(LEDGER_ROOT_DIR)
    }
}

pub fn get_service_dir(service_name: &str) -> std::path::PathBuf {
    let root_dir = get_ledger_root_dir();
    root_dir.join(service_name)
}
