mod config;
mod constants;
mod dirs;
mod hash;
mod log_util;

pub use config::*;
pub use constants::*;
pub use dirs::*;
pub use hash::*;
pub use log_util::*;

#[macro_use]
extern crate log;
