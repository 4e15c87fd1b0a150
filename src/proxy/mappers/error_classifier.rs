// 错误分类模块 - 将上游传输错误转换为可读的消息
use reqwest::Error;

/// 分类上游请求错误
///
/// 返回值: (错误类型, 英文错误消息)
/// - 错误类型: 用于日志
/// - 英文消息: 返回给调用方
pub fn classify_upstream_error(error: &Error) -> (&'static str, &'static str) {
    if error.is_timeout() {
        (
            "timeout_error",
            "Upstream request timed out, please retry later",
        )
    } else if error.is_connect() {
        (
            "connection_error",
            "Connection to upstream failed, please check your network or proxy settings",
        )
    } else if error.is_decode() || error.is_body() {
        (
            "body_error",
            "Upstream response was interrupted while reading the body",
        )
    } else if error.is_builder() {
        ("request_error", "Invalid upstream request")
    } else {
        ("unknown_error", "Unknown upstream error occurred")
    }
}
