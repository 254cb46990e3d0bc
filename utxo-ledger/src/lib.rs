mod apply;
mod key_index;
mod receiver;
mod script;
mod storage;
mod types;

pub use apply::*;
pub use key_index::*;
pub use receiver::*;
pub use script::*;
pub use storage::*;
pub use types::*;

#[macro_use]
extern crate log;
