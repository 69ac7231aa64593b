//! 通知列表查询：过滤、排序白名单、分页参数
//! Notification listing: filters, sort allow-list, paging

use serde::Deserialize;
use std::cmp::Ordering;
use utoipa::IntoParams;

use super::models::{Category, Notification, NotificationType, Priority};
use crate::conf::NotificationSettings;

/// 可排序字段（白名单）/ Sortable fields (allow-list)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    Priority,
    Category,
    Read,
    Title,
}

impl SortKey {
    /// 对应的数据库列，仅来自白名单 / Backing column, never user supplied
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at",
            SortKey::Priority => "priority_rank",
            SortKey::Category => "category",
            SortKey::Read => "read",
            SortKey::Title => "title",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "createdAt" | "created_at" => Some(SortKey::CreatedAt),
            "priority" => Some(SortKey::Priority),
            "category" => Some(SortKey::Category),
            "read" => Some(SortKey::Read),
            "title" => Some(SortKey::Title),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

impl SortSpec {
    /// 解析 `createdAt`、`-priority`、`title:asc` 等写法
    /// Accepts `createdAt`, `-priority`, `title:asc`
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (field, order) = if let Some(rest) = raw.strip_prefix('-') {
            (rest, SortOrder::Desc)
        } else if let Some((field, dir)) = raw.split_once(':') {
            let order = match dir.to_ascii_lowercase().as_str() {
                "asc" => SortOrder::Asc,
                "desc" => SortOrder::Desc,
                other => return Err(format!("unknown sort direction '{}'", other)),
            };
            (field, order)
        } else {
            (raw, SortOrder::Asc)
        };
        let key = SortKey::parse(field).ok_or_else(|| format!("field '{}' is not sortable", field))?;
        Ok(Self { key, order })
    }

    pub fn compare(&self, a: &Notification, b: &Notification) -> Ordering {
        let ord = match self.key {
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::Priority => a.priority.cmp(&b.priority),
            SortKey::Category => a.category.as_str().cmp(b.category.as_str()),
            SortKey::Read => a.read.cmp(&b.read),
            SortKey::Title => a.title.cmp(&b.title),
        };
        // 同值时按创建时间倒序、再按 id 保证稳定 / Tie-break for a stable order
        let ord = match self.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        ord.then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// 组合过滤条件 / Compound filter predicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilters {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub kind: Option<NotificationType>,
    pub read: Option<bool>,
    pub action_required: Option<bool>,
    /// 标题/正文模糊搜索 / Free text over title and message
    pub search: Option<String>,
}

impl NotificationFilters {
    pub fn matches(&self, n: &Notification) -> bool {
        if self.category.is_some_and(|c| c != n.category) {
            return false;
        }
        if self.priority.is_some_and(|p| p != n.priority) {
            return false;
        }
        if self.kind.is_some_and(|k| k != n.kind) {
            return false;
        }
        if self.read.is_some_and(|r| r != n.read) {
            return false;
        }
        if self.action_required.is_some_and(|a| a != n.action_required) {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !n.title.to_lowercase().contains(&term) && !n.message.to_lowercase().contains(&term) {
                return false;
            }
        }
        true
    }
}

/// 列表查询 / A listing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationQuery {
    pub page: u32,
    pub per_page: u32,
    pub sort: SortSpec,
    pub filters: NotificationFilters,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            sort: SortSpec::default(),
            filters: NotificationFilters::default(),
        }
    }
}

/// 原始查询串 / Raw query string parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub read: Option<bool>,
    pub action_required: Option<bool>,
    pub search: Option<String>,
}

/// 查询参数错误 / (field, message)
pub type ParamError = (&'static str, String);

impl ListParams {
    pub fn into_query(self, settings: &NotificationSettings) -> Result<NotificationQuery, ParamError> {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(settings.default_page_size)
            .clamp(1, settings.max_page_size);
        let sort = match self.sort.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => SortSpec::parse(raw).map_err(|e| ("sort", e))?,
            None => SortSpec::default(),
        };
        let filters = NotificationFilters {
            category: parse_opt(self.category.as_deref()).map_err(|e| ("category", e))?,
            priority: parse_opt(self.priority.as_deref()).map_err(|e| ("priority", e))?,
            kind: parse_opt(self.kind.as_deref()).map_err(|e| ("type", e))?,
            read: self.read,
            action_required: self.action_required,
            search: self
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        };
        Ok(NotificationQuery {
            page,
            per_page,
            sort,
            filters,
        })
    }

    /// 回写非分页参数用于 Link 头 / Re-encode non-paging params for the Link header
    pub fn passthrough_query(&self) -> String {
        let mut parts = Vec::new();
        let mut push = |k: &str, v: Option<String>| {
            if let Some(v) = v {
                parts.push(format!("{}={}", k, urlencoding::encode(&v)));
            }
        };
        push("sort", self.sort.clone());
        push("category", self.category.clone());
        push("priority", self.priority.clone());
        push("type", self.kind.clone());
        push("read", self.read.map(|b| b.to_string()));
        push("actionRequired", self.action_required.map(|b| b.to_string()));
        push("search", self.search.clone());
        parts.join("&")
    }
}

fn parse_opt<T: std::str::FromStr<Err = String>>(raw: Option<&str>) -> Result<Option<T>, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse::<T>().map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::notification::models::NewNotification;
    use chrono::{Duration, Utc};

    fn sample(title: &str, priority: Priority, read: bool, offset_secs: i64) -> Notification {
        let mut n = NewNotification::new("u1", title, format!("{} body", title))
            .into_notification(Utc::now() + Duration::seconds(offset_secs));
        n.priority = priority;
        n.read = read;
        n
    }

    #[test]
    fn test_sort_parse_forms() {
        assert_eq!(
            SortSpec::parse("-priority").unwrap(),
            SortSpec { key: SortKey::Priority, order: SortOrder::Desc }
        );
        assert_eq!(
            SortSpec::parse("title:asc").unwrap(),
            SortSpec { key: SortKey::Title, order: SortOrder::Asc }
        );
        assert_eq!(SortSpec::parse("createdAt").unwrap().order, SortOrder::Asc);
    }

    #[test]
    fn test_sort_rejects_unlisted_fields() {
        assert!(SortSpec::parse("recipient_id; DROP TABLE notifications").is_err());
        assert!(SortSpec::parse("message").is_err());
        assert!(SortSpec::parse("title:sideways").is_err());
    }

    #[test]
    fn test_filters_combine_with_search() {
        let n = sample("MRI shared", Priority::High, false, 0);
        let mut f = NotificationFilters {
            priority: Some(Priority::High),
            read: Some(false),
            search: Some("mri".to_string()),
            ..Default::default()
        };
        assert!(f.matches(&n));
        f.search = Some("x-ray".to_string());
        assert!(!f.matches(&n));
        f.search = Some("BODY".to_string());
        assert!(f.matches(&n));
        f.read = Some(true);
        assert!(!f.matches(&n));
    }

    #[test]
    fn test_priority_desc_sort() {
        let mut items = vec![
            sample("a", Priority::Low, false, 0),
            sample("b", Priority::Urgent, false, 1),
            sample("c", Priority::Medium, false, 2),
        ];
        let spec = SortSpec::parse("-priority").unwrap();
        items.sort_by(|a, b| spec.compare(a, b));
        let titles: Vec<_> = items.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_params_clamp_page_size_and_parse_enums() {
        let settings = NotificationSettings::default();
        let params = ListParams {
            page: Some(0),
            per_page: Some(10_000),
            category: Some("medical".to_string()),
            kind: Some("warning".to_string()),
            ..Default::default()
        };
        let q = params.into_query(&settings).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.per_page, settings.max_page_size);
        assert_eq!(q.filters.category, Some(Category::Medical));
        assert_eq!(q.filters.kind, Some(NotificationType::Warning));
    }

    #[test]
    fn test_params_reject_unknown_category() {
        let params = ListParams {
            category: Some("gossip".to_string()),
            ..Default::default()
        };
        let err = params.into_query(&NotificationSettings::default()).unwrap_err();
        assert_eq!(err.0, "category");
    }
}
