use serde::Serialize;

/// 分页结果 / One page of results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, per_page: u32, total: u64) -> Self {
        Self {
            items,
            page,
            per_page,
            total,
            total_pages: total_pages(total, per_page),
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

pub fn total_pages(total: u64, per_page: u32) -> u32 {
    if per_page == 0 || total == 0 {
        return 1;
    }
    u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX)
}

/// 页码转偏移 / 1-based page to row offset
pub fn offset(page: u32, per_page: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(per_page)
}

/// 构造 Link 头 / Build an RFC 8288 Link header
///
/// `extra_query` 会原样附加在分页参数之后（已编码）。
/// `extra_query` is appended after the paging params and must already be encoded.
pub fn build_link_header(base_url: &str, extra_query: &str, page: u32, per_page: u32, total: u64) -> String {
    let last = total_pages(total, per_page);
    let suffix = if extra_query.is_empty() {
        String::new()
    } else {
        format!("&{}", extra_query)
    };
    let link = |p: u32, rel: &str| {
        format!(
            "<{}?page={}&perPage={}{}>; rel=\"{}\"",
            base_url, p, per_page, suffix, rel
        )
    };

    let mut links = vec![link(1, "first"), link(last, "last")];
    if page < last {
        links.push(link(page.saturating_add(1), "next"));
    }
    if page > 1 {
        links.push(link(page.saturating_sub(1).min(last), "prev"));
    }
    links.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_header_build() {
        let h = build_link_header("/notifications", "", 2, 30, 95);
        assert!(h.contains("rel=\"next\""));
        assert!(h.contains("rel=\"prev\""));
        assert!(h.contains("page=4&perPage=30>; rel=\"last\""));
        assert!(h.contains("page=3"));
        assert!(h.contains("page=1"));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let h = build_link_header("/notifications", "read=false", 4, 30, 95);
        assert!(!h.contains("rel=\"next\""));
        assert!(h.contains("&read=false"));
    }

    #[test]
    fn test_total_pages_edges() {
        assert_eq!(total_pages(0, 20), 1);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
        assert_eq!(offset(1, 20), 0);
        assert_eq!(offset(3, 20), 40);
    }
}
