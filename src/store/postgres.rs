//! Postgres 存储后端（sqlx 运行时查询）
//! Postgres backend using sqlx runtime queries
//!
//! 表结构见 `sql/schema.sql`。
//! Schema reference: `sql/schema.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{info, warn};

use super::{
    GrantRepo, HospitalDirectory, ImageRecordRepo, NotificationRepo, StoreError, StoreResult,
};
use crate::comm::pagination::{offset, Page};
use crate::comm::{HealthCheck, HealthStatus};
use crate::conf::DatabaseSettings;
use crate::identity::Role;
use crate::modules::directory::models::ImageRecord;
use crate::modules::notification::models::{Notification, NotificationStats, Priority};
use crate::modules::notification::query::{NotificationFilters, NotificationQuery, SortOrder};
use crate::modules::sharing::models::{NewGrant, SharingGrant};

const GRANT_COLUMNS: &str = "id, image_record_id, source_doctor_id, target_doctor_id, \
     origin_doctor_id, depth, created_at, revoked_at, active";

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, sender_id, title, message, type, category, \
     priority, action_required, read, data, created_at, expires_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// 建立连接池 / Open a pool from settings
    pub async fn connect(settings: &DatabaseSettings, url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(url)
            .await?;
        info!("🗄️ Postgres pool ready (max_connections={})", settings.max_connections);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: String,
    owner_hospital_id: String,
    archive_native_id: String,
    medical_record_id: Option<String>,
    description: Option<String>,
}

impl From<ImageRow> for ImageRecord {
    fn from(r: ImageRow) -> Self {
        ImageRecord {
            id: r.id,
            owner_hospital_id: r.owner_hospital_id,
            archive_native_id: r.archive_native_id,
            medical_record_id: r.medical_record_id,
            description: r.description,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GrantRow {
    id: String,
    image_record_id: String,
    source_doctor_id: String,
    target_doctor_id: String,
    origin_doctor_id: String,
    depth: i32,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    active: bool,
}

impl TryFrom<GrantRow> for SharingGrant {
    type Error = StoreError;

    fn try_from(r: GrantRow) -> Result<Self, Self::Error> {
        let depth = u32::try_from(r.depth)
            .map_err(|_| StoreError::Corrupt(format!("grant {} has negative depth", r.id)))?;
        Ok(SharingGrant {
            id: r.id,
            image_record_id: r.image_record_id,
            source_doctor_id: r.source_doctor_id,
            target_doctor_id: r.target_doctor_id,
            origin_doctor_id: r.origin_doctor_id,
            depth,
            created_at: r.created_at,
            revoked_at: r.revoked_at,
            active: r.active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    sender_id: Option<String>,
    title: String,
    message: String,
    #[sqlx(rename = "type")]
    kind: String,
    category: String,
    priority: String,
    action_required: bool,
    read: bool,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(r: NotificationRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| StoreError::Corrupt(format!("notification {}: {}", r.id, e));
        let kind = r.kind.parse().map_err(corrupt)?;
        let category = r.category.parse().map_err(corrupt)?;
        let priority = r.priority.parse().map_err(corrupt)?;
        Ok(Notification {
            id: r.id,
            recipient_id: r.recipient_id,
            sender_id: r.sender_id,
            title: r.title,
            message: r.message,
            kind,
            category,
            priority,
            action_required: r.action_required,
            read: r.read,
            data: r.data,
            created_at: r.created_at,
            expires_at: r.expires_at,
        })
    }
}

fn priority_rank(p: Priority) -> i16 {
    match p {
        Priority::Low => 0,
        Priority::Medium => 1,
        Priority::High => 2,
        Priority::Urgent => 3,
    }
}

/// 转义 LIKE 通配符 / Escape LIKE wildcards in user text
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// 追加收件人、过期与组合过滤条件 / Append recipient, expiry and filter predicates
fn push_visibility<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    recipient_id: &'a str,
    filters: &'a NotificationFilters,
    now: DateTime<Utc>,
) {
    qb.push(" WHERE recipient_id = ")
        .push_bind(recipient_id)
        .push(" AND (expires_at IS NULL OR expires_at > ")
        .push_bind(now)
        .push(")");
    if let Some(c) = filters.category {
        qb.push(" AND category = ").push_bind(c.as_str());
    }
    if let Some(p) = filters.priority {
        qb.push(" AND priority = ").push_bind(p.as_str());
    }
    if let Some(k) = filters.kind {
        qb.push(" AND type = ").push_bind(k.as_str());
    }
    if let Some(r) = filters.read {
        qb.push(" AND read = ").push_bind(r);
    }
    if let Some(a) = filters.action_required {
        qb.push(" AND action_required = ").push_bind(a);
    }
    if let Some(term) = &filters.search {
        let pattern = like_pattern(term);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR message ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl HealthCheck for PgStore {
    async fn check_health(&self) -> HealthStatus {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => HealthStatus::new("postgres", true, None),
            Err(e) => {
                warn!("⚠️ postgres health check failed: {}", e);
                HealthStatus::new("postgres", false, Some(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl HospitalDirectory for PgStore {
    async fn hospital_endpoint(&self, hospital_id: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT imaging_endpoint FROM hospitals WHERE id = $1")
            .bind(hospital_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>("imaging_endpoint")?),
            None => Ok(None),
        }
    }

    async fn doctor_hospital(&self, doctor_id: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT hospital_id FROM users WHERE id = $1 AND role = 'doctor'")
            .bind(doctor_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>("hospital_id")?),
            None => Ok(None),
        }
    }

    async fn user_role(&self, user_id: &str) -> StoreResult<Option<Role>> {
        let row = sqlx::query("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("role")?;
                raw.parse::<Role>()
                    .map(Some)
                    .map_err(|e| StoreError::Corrupt(format!("user {}: {}", user_id, e)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ImageRecordRepo for PgStore {
    async fn find_image(&self, id: &str) -> StoreResult<Option<ImageRecord>> {
        let row = sqlx::query_as::<_, ImageRow>(
            r#"
            SELECT id, owner_hospital_id, archive_native_id, medical_record_id, description
            FROM image_records
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ImageRecord::from))
    }

    async fn insert_image(&self, record: &ImageRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO image_records (id, owner_hospital_id, archive_native_id, medical_record_id, description)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.id)
        .bind(&record.owner_hospital_id)
        .bind(&record.archive_native_id)
        .bind(&record.medical_record_id)
        .bind(&record.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl GrantRepo for PgStore {
    async fn activate_grant(&self, grant: NewGrant, now: DateTime<Utc>) -> StoreResult<(SharingGrant, bool)> {
        let image_id = grant.image_record_id.clone();
        let target_id = grant.target_doctor_id.clone();
        let row = grant.into_grant(now);
        let depth = i32::try_from(row.depth)
            .map_err(|_| StoreError::Conflict("re-share depth overflow".to_string()))?;

        // 部分唯一索引保证并发下只有一条活动授权
        let sql = format!(
            "INSERT INTO sharing_grants ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, TRUE) \
             ON CONFLICT (image_record_id, target_doctor_id) WHERE active DO NOTHING \
             RETURNING {}",
            GRANT_COLUMNS, GRANT_COLUMNS
        );
        let inserted = sqlx::query_as::<_, GrantRow>(&sql)
            .bind(&row.id)
            .bind(&row.image_record_id)
            .bind(&row.source_doctor_id)
            .bind(&row.target_doctor_id)
            .bind(&row.origin_doctor_id)
            .bind(depth)
            .bind(row.created_at)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(inserted) = inserted {
            return Ok((inserted.try_into()?, true));
        }

        match self.find_active_grant(&image_id, &target_id).await? {
            Some(existing) => Ok((existing, false)),
            None => {
                // 冲突行在两次查询之间被撤销
                warn!(image_id = %image_id, target = %target_id, "active grant vanished during activation");
                Err(StoreError::Conflict(format!(
                    "grant for image {} and doctor {} changed concurrently",
                    image_id, target_id
                )))
            }
        }
    }

    async fn find_grant(&self, id: &str) -> StoreResult<Option<SharingGrant>> {
        let sql = format!("SELECT {} FROM sharing_grants WHERE id = $1", GRANT_COLUMNS);
        let row = sqlx::query_as::<_, GrantRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SharingGrant::try_from).transpose()
    }

    async fn find_active_grant(&self, image_id: &str, target_doctor_id: &str) -> StoreResult<Option<SharingGrant>> {
        let sql = format!(
            "SELECT {} FROM sharing_grants \
             WHERE image_record_id = $1 AND target_doctor_id = $2 AND active",
            GRANT_COLUMNS
        );
        let row = sqlx::query_as::<_, GrantRow>(&sql)
            .bind(image_id)
            .bind(target_doctor_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SharingGrant::try_from).transpose()
    }

    async fn deactivate_grant(&self, id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE sharing_grants SET active = FALSE, revoked_at = $2 WHERE id = $1 AND active",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_for_target(&self, target_doctor_id: &str) -> StoreResult<Vec<SharingGrant>> {
        let sql = format!(
            "SELECT {} FROM sharing_grants WHERE target_doctor_id = $1 AND active \
             ORDER BY created_at DESC, id ASC",
            GRANT_COLUMNS
        );
        let rows = sqlx::query_as::<_, GrantRow>(&sql)
            .bind(target_doctor_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(SharingGrant::try_from).collect()
    }

    async fn list_active_from_source(&self, image_id: &str, source_doctor_id: &str) -> StoreResult<Vec<SharingGrant>> {
        let sql = format!(
            "SELECT {} FROM sharing_grants \
             WHERE image_record_id = $1 AND source_doctor_id = $2 AND active",
            GRANT_COLUMNS
        );
        let rows = sqlx::query_as::<_, GrantRow>(&sql)
            .bind(image_id)
            .bind(source_doctor_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(SharingGrant::try_from).collect()
    }
}

#[async_trait]
impl NotificationRepo for PgStore {
    async fn insert_notification(&self, n: &Notification) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO notifications ({}, priority_rank) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            NOTIFICATION_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&n.id)
            .bind(&n.recipient_id)
            .bind(&n.sender_id)
            .bind(&n.title)
            .bind(&n.message)
            .bind(n.kind.as_str())
            .bind(n.category.as_str())
            .bind(n.priority.as_str())
            .bind(n.action_required)
            .bind(n.read)
            .bind(&n.data)
            .bind(n.created_at)
            .bind(n.expires_at)
            .bind(priority_rank(n.priority))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        let sql = format!("SELECT {} FROM notifications WHERE id = $1", NOTIFICATION_COLUMNS);
        let row = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Notification::try_from).transpose()
    }

    async fn mark_read(&self, id: &str, recipient_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, recipient_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND read = FALSE")
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, id: &str, recipient_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_notifications(
        &self,
        recipient_id: &str,
        query: &NotificationQuery,
        now: DateTime<Utc>,
    ) -> StoreResult<Page<Notification>> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications");
        push_visibility(&mut count_qb, recipient_id, &query.filters, now);
        let total: i64 = count_qb.build().fetch_one(&self.pool).await?.try_get(0)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM notifications", NOTIFICATION_COLUMNS));
        push_visibility(&mut qb, recipient_id, &query.filters, now);
        // 排序列来自白名单 / Sort column comes from the allow-list
        let direction = match query.sort.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        qb.push(format!(
            " ORDER BY {} {}, created_at DESC, id ASC",
            query.sort.key.column(),
            direction
        ));
        qb.push(" LIMIT ")
            .push_bind(i64::from(query.per_page))
            .push(" OFFSET ")
            .push_bind(i64::try_from(offset(query.page, query.per_page)).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<NotificationRow>()
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(
            items,
            query.page,
            query.per_page,
            u64::try_from(total).unwrap_or(0),
        ))
    }

    async fn notification_stats(&self, recipient_id: &str, now: DateTime<Utc>) -> StoreResult<NotificationStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE NOT read) AS unread,
                COUNT(*) FILTER (WHERE priority IN ('HIGH', 'URGENT')) AS high_priority,
                COUNT(*) FILTER (WHERE action_required) AS action_required
            FROM notifications
            WHERE recipient_id = $1 AND (expires_at IS NULL OR expires_at > $2)
            "#,
        )
        .bind(recipient_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let count = |name: &str| -> StoreResult<u64> {
            let v: i64 = row.try_get(name)?;
            Ok(u64::try_from(v).unwrap_or(0))
        };
        let mut stats = NotificationStats {
            total: count("total")?,
            unread: count("unread")?,
            high_priority: count("high_priority")?,
            action_required: count("action_required")?,
            ..Default::default()
        };

        let groups = sqlx::query(
            r#"
            SELECT category, COUNT(*) AS n
            FROM notifications
            WHERE recipient_id = $1 AND (expires_at IS NULL OR expires_at > $2)
            GROUP BY category
            "#,
        )
        .bind(recipient_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        for g in groups {
            let raw: String = g.try_get("category")?;
            let n: i64 = g.try_get("n")?;
            let category = raw.parse().map_err(StoreError::Corrupt)?;
            stats.by_category.insert(category, u64::try_from(n).unwrap_or(0));
        }
        Ok(stats)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("mri"), "%mri%");
    }

    #[test]
    fn test_priority_rank_follows_severity() {
        let ranks: Vec<_> = Priority::ALL.iter().map(|p| priority_rank(*p)).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_visibility_sql_binds_user_text() {
        let filters = NotificationFilters {
            search: Some("x' OR 1=1 --".to_string()),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications");
        push_visibility(&mut qb, "u1", &filters, Utc::now());
        let sql = qb.sql();
        assert!(sql.contains("title ILIKE $3"));
        assert!(!sql.contains("1=1"));
    }
}
