//! FMD account core.
//!
//! Owns per-device-owner account records: credentials, key material, a
//! bounded location history and a bounded picture gallery. Access tokens are
//! issued by an external [`AccessController`] once a credential matches.

pub mod access;
pub mod config;
pub mod error;
pub mod id;
pub mod legacy;
pub mod manager;

pub use access::{AccessController, AccessToken};
pub use config::AccountConfig;
pub use error::{AccountError, AccountResult};
pub use id::{ID_ALPHABET, ID_ALPHABET_LEN, IdGenerator};
pub use manager::AccountManager;
