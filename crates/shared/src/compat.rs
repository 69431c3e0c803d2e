//! 来源申请的旧版数据格式
//!
//! 下游消费者仍按旧版字段名解析 `pub-request` 事件，
//! 这里负责把当前的来源申请记录转换成旧格式。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 来源申请记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRequest {
    pub id: String,
    pub source_url: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    /// `None` 表示尚未审核
    pub approved: Option<bool>,
    pub closed: bool,
    pub source_id: Option<String>,
    pub source_name: Option<String>,
    pub source_image: Option<String>,
    pub source_twitter: Option<String>,
    pub source_feed: Option<String>,
    /// 拒绝原因
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 旧版来源申请格式（`pub*` 字段名）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySourceRequest {
    pub id: String,
    pub url: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub approved: Option<bool>,
    pub closed: bool,
    pub pub_id: Option<String>,
    pub pub_name: Option<String>,
    pub pub_image: Option<String>,
    pub pub_twitter: Option<String>,
    pub pub_rss: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 转换为旧版格式
pub fn to_legacy_source_request(req: &SourceRequest) -> LegacySourceRequest {
    LegacySourceRequest {
        id: req.id.clone(),
        url: req.source_url.clone(),
        user_id: req.user_id.clone(),
        user_name: req.user_name.clone(),
        user_email: req.user_email.clone(),
        approved: req.approved,
        closed: req.closed,
        pub_id: req.source_id.clone(),
        pub_name: req.source_name.clone(),
        pub_image: req.source_image.clone(),
        pub_twitter: req.source_twitter.clone(),
        pub_rss: req.source_feed.clone(),
        reason: req.reason.clone(),
        created_at: req.created_at,
    }
}

impl From<&SourceRequest> for LegacySourceRequest {
    fn from(req: &SourceRequest) -> Self {
        to_legacy_source_request(req)
    }
}
