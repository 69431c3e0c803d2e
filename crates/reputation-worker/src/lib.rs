//! 信誉 worker
//!
//! 消费取消点赞消息，扣减帖子作者的信誉值并广播 `user-reputation-updated` 事件。

pub mod consumer;
pub mod error;
pub mod processor;
pub mod repository;
