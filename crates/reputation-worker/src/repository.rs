//! 信誉仓储
//!
//! 帖子与用户表由上游 API 维护，worker 只读取帖子作者并对作者信誉值做条件扣减。

use async_trait::async_trait;
use feed_shared::error::Result;
use sqlx::PgPool;

/// 帖子及其作者
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PostAuthor {
    pub post_id: String,
    /// 未匹配到作者的帖子为 `None`
    pub author_id: Option<String>,
}

/// 信誉仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReputationRepository: Send + Sync {
    /// 查询帖子作者，帖子不存在时返回 `None`
    async fn find_post_author(&self, post_id: &str) -> Result<Option<PostAuthor>>;

    /// 原子地扣减用户信誉值，返回扣减后的值；用户不存在时返回 `None`
    async fn decrement_reputation(&self, user_id: &str, amount: i64) -> Result<Option<i64>>;
}

/// 基于 PostgreSQL 的信誉仓储
pub struct PgReputationRepository {
    pool: PgPool,
}

impl PgReputationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReputationRepository for PgReputationRepository {
    async fn find_post_author(&self, post_id: &str) -> Result<Option<PostAuthor>> {
        let post = sqlx::query_as::<_, PostAuthor>(
            r#"
            SELECT id AS post_id, "authorId" AS author_id
            FROM post
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn decrement_reputation(&self, user_id: &str, amount: i64) -> Result<Option<i64>> {
        // 单条 UPDATE ... RETURNING，并发投递下依赖数据库的行级原子性
        let reputation = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE "user"
            SET reputation = reputation - $2
            WHERE id = $1
            RETURNING reputation::bigint
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reputation)
    }
}
