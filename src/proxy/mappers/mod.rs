// Mappers 模块 - 上游结果映射
pub mod error_classifier;

pub use error_classifier::classify_upstream_error;
