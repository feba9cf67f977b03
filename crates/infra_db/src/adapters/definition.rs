//! PostgreSQL adapter for the add-on catalog

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{DefinitionId, DomainPort, FacilityId, HealthCheckResult, HealthCheckable, PortError};
use domain_bonus::ports::DefinitionPort;
use domain_bonus::{AddOnDefinition, InsuranceCategory};

use super::probe;
use crate::repositories::DefinitionRepository;

/// PostgreSQL-backed implementation of `DefinitionPort`
#[derive(Debug, Clone)]
pub struct PostgresDefinitionAdapter {
    repository: DefinitionRepository,
    pool: PgPool,
}

impl PostgresDefinitionAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: DefinitionRepository::new(pool.clone()),
            pool,
        }
    }

    /// The underlying repository, for catalog maintenance outside the port
    pub fn repository(&self) -> &DefinitionRepository {
        &self.repository
    }
}

impl DomainPort for PostgresDefinitionAdapter {}

#[async_trait]
impl HealthCheckable for PostgresDefinitionAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-definition-adapter").await
    }
}

#[async_trait]
impl DefinitionPort for PostgresDefinitionAdapter {
    #[instrument(skip(self), fields(facility_id = %facility_id))]
    async fn find_effective(
        &self,
        visit_date: NaiveDate,
        facility_id: FacilityId,
        insurance_category: InsuranceCategory,
    ) -> Result<Vec<AddOnDefinition>, PortError> {
        let definitions = self
            .repository
            .find_effective(visit_date, facility_id, insurance_category)
            .await?;
        debug!(count = definitions.len(), "Effective definitions loaded");
        Ok(definitions)
    }

    #[instrument(skip(self), fields(definition_id = %id))]
    async fn get_definition(&self, id: DefinitionId) -> Result<AddOnDefinition, PortError> {
        Ok(self.repository.get(id).await?)
    }
}
