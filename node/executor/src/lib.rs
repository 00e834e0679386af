//! Keeper node executor: runs dispatched tasks and publishes signed bundles.

pub mod abi;
mod action;
pub mod convert;
pub mod custom;
pub mod dynamic;
pub mod executor;
pub mod nonce;
pub mod sandbox;

pub use action::{lead_time, PreparedCall};
pub use executor::{TaskExecutor, TaskOutcome};
pub use nonce::{NonceError, NonceManager};
pub use sandbox::{ScriptOutcome, ScriptRequest, ScriptRunner, WasmScriptRunner};
