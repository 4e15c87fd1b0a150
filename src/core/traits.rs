//! 核心 trait 定义
//! 用于解耦轮换引擎与存储/运行时

use std::path::PathBuf;

use crate::core::storage::VaultError;

/// 存储配置 trait
/// 抽象数据目录和文件系统操作
pub trait StorageConfig: Send + Sync {
    /// 获取数据目录路径
    fn data_dir(&self) -> PathBuf;

    /// 加密 Token 文件路径
    fn tokens_path(&self) -> PathBuf {
        self.data_dir().join("tokens.enc")
    }
}

/// 默认存储配置 (使用 ~/.github_token_proxy/)
pub struct DefaultStorageConfig {
    data_dir: PathBuf,
}

impl DefaultStorageConfig {
    pub fn new() -> Result<Self, String> {
        let home = dirs::home_dir().ok_or_else(|| "无法获取用户主目录".to_string())?;
        Self::with_path(home.join(".github_token_proxy"))
    }

    /// 从指定路径创建
    pub fn with_path(data_dir: PathBuf) -> Result<Self, String> {
        std::fs::create_dir_all(&data_dir).map_err(|e| format!("创建数据目录失败: {}", e))?;

        Ok(Self { data_dir })
    }
}

impl StorageConfig for DefaultStorageConfig {
    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }
}

/// Token 持久化能力
///
/// 持久化的内容永远是完整的有序 Token 列表，没有版本字段。
/// 实现方负责加解密，调用方只看到明文列表。
pub trait TokenPersistence: Send + Sync {
    /// 读取持久化的 Token 列表
    fn load(&self) -> Result<Vec<String>, VaultError>;

    /// 覆盖写入完整 Token 列表
    fn save(&self, tokens: &[String]) -> Result<(), VaultError>;

    /// 删除持久化数据 (不存在时视为成功)
    fn delete(&self) -> Result<(), VaultError>;
}
