mod address;
mod utxo;

pub use address::*;
pub use utxo::*;
