//! PostgreSQL adapter for calculation history
//!
//! Replacing a visit's rows runs in one database transaction: the rows are
//! locked, read, deleted and rewritten, and only the commit makes the new
//! set visible. Dropping an uncommitted `PostgresHistoryTransaction` rolls
//! it back.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use core_kernel::{
    DateRange, DomainPort, HealthCheckResult, HealthCheckable, HistoryId, PatientId, PortError,
    VisitId,
};
use domain_bonus::ports::{HistoryPort, HistoryTransaction};
use domain_bonus::{CalculationHistoryRecord, LinkState};

use super::probe;
use crate::error::DatabaseError;
use crate::repositories::HistoryRepository;

/// PostgreSQL-backed implementation of `HistoryPort`
#[derive(Debug, Clone)]
pub struct PostgresHistoryAdapter {
    repository: HistoryRepository,
}

impl PostgresHistoryAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: HistoryRepository::new(pool),
        }
    }

    pub fn repository(&self) -> &HistoryRepository {
        &self.repository
    }
}

/// An open history transaction
pub struct PostgresHistoryTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl HistoryTransaction for PostgresHistoryTransaction {
    async fn load_for_visit(
        &mut self,
        visit_id: VisitId,
    ) -> Result<Vec<CalculationHistoryRecord>, PortError> {
        Ok(HistoryRepository::lock_for_visit(&mut *self.tx, visit_id).await?)
    }

    async fn delete_for_visit(&mut self, visit_id: VisitId) -> Result<u64, PortError> {
        Ok(HistoryRepository::delete_for_visit(&mut *self.tx, visit_id).await?)
    }

    async fn insert(&mut self, record: &CalculationHistoryRecord) -> Result<(), PortError> {
        Ok(HistoryRepository::insert(&mut *self.tx, record).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx
            .commit()
            .await
            .map_err(|e| PortError::from(DatabaseError::TransactionFailed(e.to_string())))
    }
}

impl DomainPort for PostgresHistoryAdapter {}

#[async_trait]
impl HealthCheckable for PostgresHistoryAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        probe(self.repository.pool(), "postgres-history-adapter").await
    }
}

#[async_trait]
impl HistoryPort for PostgresHistoryAdapter {
    async fn begin(&self) -> Result<Box<dyn HistoryTransaction>, PortError> {
        let tx = self
            .repository
            .pool()
            .begin()
            .await
            .map_err(DatabaseError::from)?;
        Ok(Box::new(PostgresHistoryTransaction { tx }))
    }

    #[instrument(skip(self), fields(visit_id = %visit_id))]
    async fn find_by_visit(&self, visit_id: VisitId) -> Result<Vec<CalculationHistoryRecord>, PortError> {
        Ok(self.repository.find_by_visit(visit_id).await?)
    }

    #[instrument(skip(self), fields(patient_id = %patient_id))]
    async fn count_monthly_occurrences(
        &self,
        patient_id: PatientId,
        code: &str,
        month: DateRange,
        exclude_visit: VisitId,
    ) -> Result<u32, PortError> {
        let count = self
            .repository
            .count_monthly_occurrences(patient_id, code, month, exclude_visit)
            .await?;
        debug!(count, "Monthly occurrences counted");
        Ok(count)
    }

    #[instrument(skip(self), fields(history_id = %id, link_state = link_state.as_str()))]
    async fn set_billing_link(
        &self,
        id: HistoryId,
        billing_code_id: Option<String>,
        link_state: LinkState,
    ) -> Result<CalculationHistoryRecord, PortError> {
        Ok(self
            .repository
            .set_billing_link(id, billing_code_id.as_deref(), link_state)
            .await?)
    }
}
