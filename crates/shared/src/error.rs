//! 统一错误处理模块
//!
//! 定义系统中所有共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 发布链路的错误在发布器内部消化；消费链路的错误交给消费循环，
//! 由 [`FeedError::is_retryable`] 决定重投递还是转入死信 topic。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum FeedError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 序列化错误 ====================
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 消息错误 ====================
    /// 入站消息负载不符合约定格式，重投递也不会成功
    #[error("消息格式错误: {0}")]
    InvalidMessage(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, FeedError>;

impl FeedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidMessage(_) => "INVALID_MESSAGE",
        }
    }

    /// 是否为可重试错误
    ///
    /// 消费循环据此决定：可重试的退回消费位置重新投递，其余转入死信 topic。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Kafka(_))
    }
}
