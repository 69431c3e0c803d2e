//! 共享库
//!
//! 包含所有服务共用的配置、错误处理、数据库连接、Kafka、可观测性基础设施，
//! 以及领域事件模型和事件发布器。

pub mod compat;
pub mod config;
pub mod database;
pub mod delivery;
pub mod error;
pub mod events;
pub mod kafka;
pub mod observability;
pub mod publisher;
pub mod test_utils;
