//! Billing code repository
//!
//! Billing codes map an add-on code and insurance category to the code
//! claimed on the bill, within a validity window.

use chrono::NaiveDate;
use sqlx::PgPool;

use domain_bonus::InsuranceCategory;

use crate::error::DatabaseError;

/// Row from `billing_codes`
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BillingCodeRow {
    pub billing_code_id: String,
    pub add_on_code: String,
    pub insurance_category: String,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    pub priority: i32,
}

impl BillingCodeRow {
    pub fn new(
        billing_code_id: impl Into<String>,
        add_on_code: impl Into<String>,
        insurance_category: InsuranceCategory,
        valid_from: NaiveDate,
    ) -> Self {
        Self {
            billing_code_id: billing_code_id.into(),
            add_on_code: add_on_code.into(),
            insurance_category: insurance_category.as_str().to_string(),
            valid_from,
            valid_to: None,
            priority: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BillingCodeRepository {
    pool: PgPool,
}

impl BillingCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The highest-priority code valid on the date, if any
    pub async fn select(
        &self,
        add_on_code: &str,
        insurance_category: InsuranceCategory,
        visit_date: NaiveDate,
    ) -> Result<Option<String>, DatabaseError> {
        let code = sqlx::query_scalar::<_, String>(
            r#"
            SELECT billing_code_id
            FROM billing_codes
            WHERE add_on_code = $1
              AND insurance_category = $2
              AND valid_from <= $3
              AND (valid_to IS NULL OR valid_to >= $3)
            ORDER BY priority DESC, valid_from DESC, billing_code_id
            LIMIT 1
            "#,
        )
        .bind(add_on_code)
        .bind(insurance_category.as_str())
        .bind(visit_date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    pub async fn insert(&self, row: &BillingCodeRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO billing_codes (
                billing_code_id, add_on_code, insurance_category, valid_from, valid_to, priority
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&row.billing_code_id)
        .bind(&row.add_on_code)
        .bind(&row.insurance_category)
        .bind(row.valid_from)
        .bind(row.valid_to)
        .bind(row.priority)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
