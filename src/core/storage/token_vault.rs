//! 加密 Token 存储
//! AES-256-GCM 加密后以 base64 写入单个文件

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::traits::TokenPersistence;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("token file not found: {0}")]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid base64 payload: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("payload too short ({0} bytes)")]
    Truncated(usize),

    #[error("decryption failed (wrong key or corrupted file)")]
    Decrypt,

    #[error("encryption failed")]
    Encrypt,

    #[error("invalid token list: {0}")]
    Format(#[from] serde_json::Error),
}

/// 从配置的 secret 派生 256 位密钥
///
/// 64 位十六进制串直接作为密钥使用，其余任意字符串经 SHA-256 派生。
pub fn derive_key(secret: &str) -> [u8; 32] {
    let trimmed = secret.trim();
    if trimmed.len() == 64 {
        if let Ok(bytes) = hex::decode(trimmed) {
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            return key;
        }
    }
    let digest = Sha256::digest(trimmed.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

/// 生成一次性随机密钥 (未配置 SECRET_KEY 时使用)
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// 加密文件 Token 存储
pub struct EncryptedFileVault {
    path: PathBuf,
    key: [u8; 32],
}

impl EncryptedFileVault {
    pub fn new(path: PathBuf, key: [u8; 32]) -> Self {
        Self { path, key }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    /// 加密明文，输出 base64(nonce || ciphertext)
    fn seal(&self, plaintext: &[u8]) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| VaultError::Encrypt)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(payload))
    }

    fn open(&self, encoded: &str) -> Result<Vec<u8>, VaultError> {
        let payload = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        if payload.len() <= NONCE_LEN {
            return Err(VaultError::Truncated(payload.len()));
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::Decrypt)
    }
}

impl TokenPersistence for EncryptedFileVault {
    fn load(&self) -> Result<Vec<String>, VaultError> {
        if !self.path.exists() {
            return Err(VaultError::NotFound(self.path.clone()));
        }
        let encoded = fs::read_to_string(&self.path)?;
        let plaintext = self.open(&encoded)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn save(&self, tokens: &[String]) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(tokens)?;
        let sealed = self.seal(&plaintext)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // 原子写入
        let temp_path = self.path.with_extension("enc.tmp");
        fs::write(&temp_path, sealed)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn delete(&self) -> Result<(), VaultError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
