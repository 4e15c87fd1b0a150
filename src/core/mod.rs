//! 核心模块
//! 配置模型、持久化与存储抽象

pub mod models;
pub mod storage;
pub mod traits;

// 重导出常用类型
pub use traits::{DefaultStorageConfig, StorageConfig, TokenPersistence};
