//! Shared list filtering, sorting and pagination.
//!
//! Every list endpoint takes the same [`ListQuery`] and turns it into a
//! parameterized WHERE clause with [`Filter`]. Column names never come from
//! user input: sorting goes through an allow-list and search terms are bound.

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, SqlitePool};

const DEFAULT_PER_PAGE: i64 = 25;
const MAX_PER_PAGE: i64 = 100;
/// Keeps `offset()` within i64 for any per-page size
const MAX_PAGE: i64 = i64::MAX / MAX_PER_PAGE;

/// Query parameters accepted by list and export endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListQuery {
    /// Case-insensitive substring matched against the entity's display fields
    pub search: Option<String>,
    pub status: Option<String>,
    /// Users only
    pub role: Option<String>,
    /// Properties only
    pub property_type: Option<String>,
    /// Transactions only: income or expense
    pub kind: Option<String>,
    pub category: Option<String>,
    pub property_id: Option<String>,
    pub lease_id: Option<String>,
    /// Inclusive lower bound on the entity's date column
    pub start_date: Option<String>,
    /// Inclusive upper bound on the entity's date column
    pub end_date: Option<String>,
    pub sort: Option<String>,
    /// `asc` or `desc`
    pub order: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.per_page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.per_page - 1) / self.per_page
    }
}

/// One page of a list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

/// Builder for a parameterized WHERE clause
#[derive(Debug, Default)]
pub struct Filter {
    conditions: Vec<String>,
    bindings: Vec<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`, skipped when the value is absent or blank
    pub fn eq(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = non_blank(value) {
            self.conditions.push(format!("{} = ?", column));
            self.bindings.push(v.to_string());
        }
        self
    }

    pub fn gte(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = non_blank(value) {
            self.conditions.push(format!("{} >= ?", column));
            self.bindings.push(v.to_string());
        }
        self
    }

    pub fn lte(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = non_blank(value) {
            self.conditions.push(format!("{} <= ?", column));
            self.bindings.push(v.to_string());
        }
        self
    }

    /// Match rows where any of `columns` contains `term`, ignoring case.
    ///
    /// SQLite's `LOWER()` only folds ASCII, so the term is folded the same
    /// way: non-ASCII letters must match their stored case.
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(term) = non_blank(term) else {
            return self;
        };
        if columns.is_empty() {
            return self;
        }

        let pattern = format!("%{}%", escape_like(&term.to_ascii_lowercase()));
        let clauses: Vec<String> = columns
            .iter()
            .map(|c| format!("LOWER(COALESCE({}, '')) LIKE ? ESCAPE '\\'", c))
            .collect();
        self.conditions.push(format!("({})", clauses.join(" OR ")));
        for _ in columns {
            self.bindings.push(pattern.clone());
        }
        self
    }

    /// Raw condition with its own bindings
    pub fn raw(&mut self, condition: &str, bindings: &[&str]) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.bindings.extend(bindings.iter().map(|b| b.to_string()));
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn bindings(&self) -> &[String] {
        &self.bindings
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Build an ORDER BY clause from an allow-list of `(param, column)` pairs.
/// Unknown sort keys fall back to `default`, newest first.
pub fn order_by(
    sort: Option<&str>,
    order: Option<&str>,
    allowed: &[(&str, &str)],
    default: &str,
) -> String {
    let column = sort
        .and_then(|s| allowed.iter().find(|(key, _)| *key == s))
        .map(|(_, column)| *column)
        .unwrap_or(default);
    let direction = match order.map(str::to_ascii_lowercase).as_deref() {
        Some("asc") => "ASC",
        _ => "DESC",
    };
    format!("ORDER BY {} {}", column, direction)
}

/// Run a count plus a paginated select over `from` with the given filter.
///
/// `select` is the column list (e.g. `l.*` when `from` contains joins).
pub async fn fetch_page<T>(
    db: &SqlitePool,
    select: &str,
    from: &str,
    filter: &Filter,
    order: &str,
    pagination: Pagination,
) -> Result<Page<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let where_clause = filter.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM {} {}", from, where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for binding in filter.bindings() {
        count_query = count_query.bind(binding);
    }
    let total = count_query.fetch_one(db).await?;

    let sql = format!(
        "SELECT {} FROM {} {} {} LIMIT ? OFFSET ?",
        select, from, where_clause, order
    );
    let mut items_query = sqlx::query_as::<_, T>(&sql);
    for binding in filter.bindings() {
        items_query = items_query.bind(binding);
    }
    let items = items_query
        .bind(pagination.per_page)
        .bind(pagination.offset())
        .fetch_all(db)
        .await?;

    Ok(Page {
        items,
        total,
        page: pagination.page,
        per_page: pagination.per_page,
        total_pages: pagination.total_pages(total),
    })
}

/// Unpaginated variant of [`fetch_page`], used by CSV exports
pub async fn fetch_all<T>(
    db: &SqlitePool,
    select: &str,
    from: &str,
    filter: &Filter,
    order: &str,
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let sql = format!(
        "SELECT {} FROM {} {} {}",
        select,
        from,
        filter.where_clause(),
        order
    );
    let mut query = sqlx::query_as::<_, T>(&sql);
    for binding in filter.bindings() {
        query = query.bind(binding);
    }
    query.fetch_all(db).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_clamping() {
        let p = Pagination::new(None, None);
        assert_eq!(p, Pagination { page: 1, per_page: 25 });

        let p = Pagination::new(Some(0), Some(1000));
        assert_eq!(p, Pagination { page: 1, per_page: 100 });

        let p = Pagination::new(Some(3), Some(10));
        assert_eq!(p.offset(), 20);
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let p = Pagination::new(Some(i64::MAX), Some(100));
        assert_eq!(p.page, MAX_PAGE);
        assert!(p.offset() > 0);

        let p = Pagination::new(Some(i64::MAX), Some(1));
        assert!(p.offset() > 0);
    }

    #[test]
    fn test_total_pages() {
        let p = Pagination::new(Some(1), Some(10));
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(10), 1);
        assert_eq!(p.total_pages(11), 2);
    }

    #[test]
    fn test_filter_skips_blank_values() {
        let mut f = Filter::new();
        f.eq("status", Some("  ")).eq("role", None).search(&["name"], Some(""));
        assert_eq!(f.where_clause(), "");
        assert!(f.bindings().is_empty());
    }

    #[test]
    fn test_filter_search_binds_lowercase_pattern_per_column() {
        let mut f = Filter::new();
        f.eq("status", Some("active")).search(&["name", "email"], Some("AcMe"));
        assert_eq!(
            f.where_clause(),
            "WHERE status = ? AND (LOWER(COALESCE(name, '')) LIKE ? ESCAPE '\\' OR LOWER(COALESCE(email, '')) LIKE ? ESCAPE '\\')"
        );
        assert_eq!(f.bindings(), &["active", "%acme%", "%acme%"]);
    }

    #[test]
    fn test_like_wildcards_are_escaped() {
        let mut f = Filter::new();
        f.search(&["title"], Some("50%_off"));
        assert_eq!(f.bindings(), &["%50\\%\\_off%"]);
    }

    #[test]
    fn test_order_by_allow_list() {
        let allowed = [("name", "name"), ("created", "created_at")];
        assert_eq!(
            order_by(Some("name"), Some("asc"), &allowed, "created_at"),
            "ORDER BY name ASC"
        );
        assert_eq!(
            order_by(Some("password_hash; DROP"), None, &allowed, "created_at"),
            "ORDER BY created_at DESC"
        );
    }

    #[tokio::test]
    async fn test_fetch_page_case_insensitive_search() {
        let pool = crate::db::init_memory().await.unwrap();
        for (id, name) in [("o1", "Acme Logistics"), ("o2", "Northwind"), ("o3", "ACME Retail")] {
            sqlx::query("INSERT INTO organizations (id, name) VALUES (?, ?)")
                .bind(id)
                .bind(name)
                .execute(&pool)
                .await
                .unwrap();
        }

        let mut filter = Filter::new();
        filter.search(&["name"], Some("acme"));
        let page: Page<(String, String)> = fetch_page(
            &pool,
            "id, name",
            "organizations",
            &filter,
            "ORDER BY name ASC",
            Pagination::new(Some(1), Some(1)),
        )
        .await
        .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].1, "ACME Retail");
    }

    #[tokio::test]
    async fn test_search_folds_ascii_only_like_sqlite() {
        let pool = crate::db::init_memory().await.unwrap();
        sqlx::query("INSERT INTO organizations (id, name) VALUES ('o1', 'École Partners')")
            .execute(&pool)
            .await
            .unwrap();

        let count = |term: &'static str| {
            let pool = pool.clone();
            async move {
                let mut filter = Filter::new();
                filter.search(&["name"], Some(term));
                let page: Page<(String,)> = fetch_page(
                    &pool,
                    "id",
                    "organizations",
                    &filter,
                    "ORDER BY id",
                    Pagination::new(None, None),
                )
                .await
                .unwrap();
                page.total
            }
        };

        assert_eq!(count("ÉCOLE").await, 1);
        assert_eq!(count("école partners").await, 0);
        assert_eq!(count("PARTNERS").await, 1);
    }
}
