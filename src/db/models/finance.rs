//! Financial transactions: rent income and property expenses.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::query::Filter;
use crate::utils::csv::CsvRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Income => write!(f, "income"),
            TransactionKind::Expense => write!(f, "expense"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: String,
    pub lease_id: Option<String>,
    pub property_id: Option<String>,
    pub kind: TransactionKind,
    pub category: String,
    pub amount: f64,
    pub occurred_on: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
}

impl CsvRecord for Transaction {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "occurred_on",
            "kind",
            "category",
            "amount",
            "lease_id",
            "property_id",
            "description",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.occurred_on.clone(),
            self.kind.to_string(),
            self.category.clone(),
            format!("{:.2}", self.amount),
            self.lease_id.clone().unwrap_or_default(),
            self.property_id.clone().unwrap_or_default(),
            self.description.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub lease_id: Option<String>,
    pub property_id: Option<String>,
    pub kind: TransactionKind,
    pub category: String,
    pub amount: f64,
    pub occurred_on: String,
    pub description: Option<String>,
}

/// Category that rent payments recorded against a lease are booked under
pub const RENT_CATEGORY: &str = "rent";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct CategoryTotal {
    pub kind: TransactionKind,
    pub category: String,
    pub total: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FinanceSummary {
    pub income: f64,
    pub expense: f64,
    pub net: f64,
    pub by_category: Vec<CategoryTotal>,
}

impl FinanceSummary {
    pub fn from_categories(by_category: Vec<CategoryTotal>) -> Self {
        let (income, expense) = by_category.iter().fold((0.0, 0.0), |(i, e), c| match c.kind {
            TransactionKind::Income => (i + c.total, e),
            TransactionKind::Expense => (i, e + c.total),
        });
        Self {
            income,
            expense,
            net: income - expense,
            by_category,
        }
    }
}

/// Income/expense totals per category for the transactions matching `filter`
pub async fn summarize_transactions(
    db: &SqlitePool,
    filter: &Filter,
) -> Result<FinanceSummary, sqlx::Error> {
    let sql = format!(
        "SELECT kind, category, COALESCE(SUM(amount), 0.0) AS total, COUNT(*) AS count \
         FROM transactions {} GROUP BY kind, category ORDER BY kind, total DESC",
        filter.where_clause()
    );
    let mut query = sqlx::query_as::<_, CategoryTotal>(&sql);
    for binding in filter.bindings() {
        query = query.bind(binding);
    }
    let rows = query.fetch_all(db).await?;
    Ok(FinanceSummary::from_categories(rows))
}
