//! 持久化层

pub mod token_vault;

pub use token_vault::{derive_key, generate_key, EncryptedFileVault, VaultError};
