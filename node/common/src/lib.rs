pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod proof;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{KeeperError, Result};
