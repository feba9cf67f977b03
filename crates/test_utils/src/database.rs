//! Database Test Utilities
//!
//! A PostgreSQL container with the bonus schema applied, plus a
//! [`PostgresScenario`] that seeds reference records through the
//! repositories and wires the PostgreSQL adapters into a `BonusService`.
//!
//! Tests using these helpers need Docker and are marked `#[ignore]`.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use domain_bonus::{
    AddOnDefinition, BonusService, EngineSettings, FacilityRecord, PatientRecord, StaffRecord,
    VisitRecord,
};
use infra_db::repositories::{BillingCodeRow, DefinitionRepository, VisitRepository};
use infra_db::{
    PostgresBillingCodeAdapter, PostgresDefinitionAdapter, PostgresHistoryAdapter,
    PostgresVisitAdapter, MIGRATOR,
};

use crate::builders::{FacilityRecordBuilder, PatientRecordBuilder, VisitRecordBuilder};
use crate::fixtures::TemporalFixtures;

const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "bonus_test";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connection settings of a test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A running PostgreSQL container with migrations applied
pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a container and runs the embedded migrations
    pub async fn new() -> Result<Self, BoxError> {
        let container = Postgres::default()
            .with_user(POSTGRES_USER)
            .with_password(POSTGRES_PASSWORD)
            .with_db_name(POSTGRES_DB)
            .with_tag(POSTGRES_TAG)
            .start()
            .await?;

        let config = TestDatabaseConfig {
            host: container.get_host().await?.to_string(),
            port: container.get_host_port_ipv4(5432).await?,
            ..TestDatabaseConfig::default()
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.connection_url())
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self {
            _container: container,
            config,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Empties every table while keeping the schema
    pub async fn clear_data(&self) -> Result<(), BoxError> {
        sqlx::query(
            "TRUNCATE TABLE calculation_history, billing_codes, addon_definitions, visits, staff, patients, facilities CASCADE",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// A container shared by every test in the binary
///
/// # Panics
///
/// Panics if the container cannot be started
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// A fresh container for a test that needs isolation
pub async fn create_isolated_test_database() -> Result<TestDatabase, BoxError> {
    TestDatabase::new().await
}

/// Declares an ignored tokio test that receives an isolated database
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires docker"]
        async fn $name() {
            let $db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            $body
        }
    };
}

/// The PostgreSQL counterpart of [`crate::BonusScenario`]
///
/// Seeds one facility and one patient and builds a `BonusService` over the
/// PostgreSQL adapters.
pub struct PostgresScenario {
    pub pool: PgPool,
    pub facility: FacilityRecord,
    pub patient: PatientRecord,
    pub settings: EngineSettings,
    visits: VisitRepository,
    definitions: DefinitionRepository,
}

impl PostgresScenario {
    pub async fn new(pool: PgPool) -> Result<Self, BoxError> {
        Self::with(pool, FacilityRecordBuilder::new().build(), PatientRecordBuilder::new().build()).await
    }

    pub async fn with(pool: PgPool, facility: FacilityRecord, patient: PatientRecord) -> Result<Self, BoxError> {
        let visits = VisitRepository::new(pool.clone());
        visits.insert_facility(&facility).await?;
        visits.insert_patient(&patient).await?;
        Ok(Self {
            definitions: DefinitionRepository::new(pool.clone()),
            visits,
            pool,
            facility,
            patient,
            settings: EngineSettings::default().with_timezone(TemporalFixtures::tokyo()),
        })
    }

    pub async fn define(&self, definitions: impl IntoIterator<Item = AddOnDefinition>) -> Result<(), BoxError> {
        for definition in definitions {
            self.definitions.insert(&definition).await?;
        }
        Ok(())
    }

    pub fn visit(&self) -> VisitRecordBuilder {
        VisitRecordBuilder::new(self.patient.id, self.facility.id)
    }

    pub async fn record(&self, visit: VisitRecord) -> Result<VisitRecord, BoxError> {
        self.visits.upsert_visit(&visit).await?;
        Ok(visit)
    }

    pub async fn add_patient(&self, patient: PatientRecord) -> Result<PatientRecord, BoxError> {
        self.visits.insert_patient(&patient).await?;
        Ok(patient)
    }

    pub async fn add_staff(&self, staff: StaffRecord) -> Result<StaffRecord, BoxError> {
        self.visits.insert_staff(&staff).await?;
        Ok(staff)
    }

    pub async fn billing_code(&self, row: BillingCodeRow) -> Result<(), BoxError> {
        PostgresBillingCodeAdapter::new(self.pool.clone())
            .repository()
            .insert(&row)
            .await?;
        Ok(())
    }

    pub fn service(&self) -> BonusService {
        BonusService::new(
            Arc::new(PostgresDefinitionAdapter::new(self.pool.clone())),
            Arc::new(PostgresVisitAdapter::new(self.pool.clone())),
            Arc::new(PostgresHistoryAdapter::new(self.pool.clone())),
            Arc::new(PostgresBillingCodeAdapter::new(self.pool.clone())),
            self.settings.clone(),
        )
    }
}
