//! Data source abstraction: where a run's raw records come from.

use async_trait::async_trait;

use uplink_core::mapping::FieldMapping;
use uplink_core::{DatabaseConfig, RawRecord, RunSource, UplinkError};

/// A finite, one-shot producer of raw records for a single run.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Produce the full record set. Dates are already normalized to
    /// `YYYY-MM-DD` when records leave this method.
    async fn fetch(&self) -> Result<Vec<RawRecord>, UplinkError>;

    /// Tag recorded in run history for runs driven by this source.
    fn source(&self) -> RunSource;
}

/// Records extracted from the configured relational database using a
/// field mapping, restricted to today's report date.
pub struct DatabaseSource {
    config: DatabaseConfig,
    mapping: FieldMapping,
    source: RunSource,
}

impl DatabaseSource {
    pub fn new(config: DatabaseConfig, mapping: FieldMapping, source: RunSource) -> Self {
        Self {
            config,
            mapping,
            source,
        }
    }
}

#[async_trait]
impl DataSource for DatabaseSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>, UplinkError> {
        let today = chrono::Local::now().date_naive();
        uplink_db::fetch_records(&self.config, &self.mapping, today).await
    }

    fn source(&self) -> RunSource {
        self.source
    }
}
