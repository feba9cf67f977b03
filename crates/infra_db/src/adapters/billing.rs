//! PostgreSQL adapter for billing code suggestion

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, PortError};
use domain_bonus::ports::BillingCodePort;
use domain_bonus::InsuranceCategory;

use super::probe;
use crate::repositories::BillingCodeRepository;

/// Suggests billing codes from the `billing_codes` table
#[derive(Debug, Clone)]
pub struct PostgresBillingCodeAdapter {
    repository: BillingCodeRepository,
    pool: PgPool,
}

impl PostgresBillingCodeAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingCodeRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn repository(&self) -> &BillingCodeRepository {
        &self.repository
    }
}

impl DomainPort for PostgresBillingCodeAdapter {}

#[async_trait]
impl HealthCheckable for PostgresBillingCodeAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-billing-code-adapter").await
    }
}

#[async_trait]
impl BillingCodePort for PostgresBillingCodeAdapter {
    #[instrument(skip(self))]
    async fn select_billing_code(
        &self,
        add_on_code: &str,
        insurance_category: InsuranceCategory,
        visit_date: NaiveDate,
    ) -> Result<Option<String>, PortError> {
        let code = self
            .repository
            .select(add_on_code, insurance_category, visit_date)
            .await?;
        if code.is_none() {
            debug!("No billing code configured");
        }
        Ok(code)
    }
}
