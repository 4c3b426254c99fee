//! Database connection and operations

pub mod candidates;
pub mod leases;
pub mod rules;
pub mod scans;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use candidates::{
    CandidateFilter, CandidateRecord, CandidateRepository, CreateCandidate, ReviewStatus,
};
pub use leases::{scan_lease_name, LeaseRecord, LeaseRepository, ACTION_EXECUTOR_LEASE};
pub use rules::{CreateRule, RuleAction, RuleRecord, RuleRepository, UpdateRule};
pub use scans::{ScanCounts, ScanRecord, ScanRepository, ScanStatus};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5)
    }

    /// Open (creating if needed) the SQLite database at `path`
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a rules repository
    pub fn rules(&self) -> RuleRepository {
        RuleRepository::new(self.pool.clone())
    }

    /// Get a scans repository
    pub fn scans(&self) -> ScanRepository {
        ScanRepository::new(self.pool.clone())
    }

    /// Get a candidates repository
    pub fn candidates(&self) -> CandidateRepository {
        CandidateRepository::new(self.pool.clone())
    }

    /// Get a worker leases repository
    pub fn leases(&self) -> LeaseRepository {
        LeaseRepository::new(self.pool.clone())
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}
