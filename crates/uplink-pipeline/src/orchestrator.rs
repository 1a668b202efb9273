//! The upload run state machine.
//!
//! One run walks `Idle → Authenticating → Fetching → Validating →
//! Uploading` and ends in `Succeeded` or `Failed(stage)`. Every terminal
//! state appends exactly one history entry, whichever stage the run died
//! in. A run lock at the first transition keeps concurrent triggers from
//! interleaving against the same history file; a refused trigger returns
//! [`RunOutcome::Busy`] and appends nothing.

use std::fmt;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use uplink_api_client::ReportApi;
use uplink_core::{
    validate_batch, ApiConfig, HistoryStore, RetailRecord, RunHistoryEntry, RunSource, RunStatus,
    UplinkError,
};

use crate::source::DataSource;

/// Stage a failed run died in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Auth,
    Fetch,
    Validation,
    NoData,
    Upload,
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedStage::Auth => write!(f, "auth"),
            FailedStage::Fetch => write!(f, "fetch"),
            FailedStage::Validation => write!(f, "validation"),
            FailedStage::NoData => write!(f, "no-data"),
            FailedStage::Upload => write!(f, "upload"),
        }
    }
}

/// Terminal result of one trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded {
        record_count: usize,
        message: String,
    },
    Failed {
        stage: FailedStage,
        record_count: usize,
        message: String,
        error_detail: Option<String>,
    },
    /// A run was already in flight; nothing happened.
    Busy,
}

impl RunOutcome {
    /// Process exit code distinguishing every failure reason.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Succeeded { .. } => 0,
            RunOutcome::Failed { stage, .. } => match stage {
                FailedStage::Auth => 2,
                FailedStage::Fetch => 3,
                FailedStage::Validation => 4,
                FailedStage::NoData => 5,
                FailedStage::Upload => 6,
            },
            RunOutcome::Busy => 7,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, RunOutcome::Succeeded { .. })
    }

    /// Human-readable summary for the trigger source. Stage name plus
    /// original diagnostic; internal error kinds stay internal.
    pub fn message(&self) -> String {
        match self {
            RunOutcome::Succeeded { message, .. } => message.clone(),
            RunOutcome::Failed { message, .. } => message.clone(),
            RunOutcome::Busy => "a run is already in progress".to_string(),
        }
    }
}

/// Sequences DataSource → Validator → APIClient and owns the history
/// file. One instance per process; the run lock lives here.
pub struct UploadOrchestrator {
    history: HistoryStore,
    running: Mutex<()>,
}

impl UploadOrchestrator {
    pub fn new(history: HistoryStore) -> Self {
        Self {
            history,
            running: Mutex::new(()),
        }
    }

    fn record_history(
        &self,
        status: RunStatus,
        record_count: usize,
        message: &str,
        error_detail: Option<String>,
        source: RunSource,
    ) {
        let entry = RunHistoryEntry::new(status, record_count, message, error_detail, source);
        if let Err(e) = self.history.append(entry) {
            // The audit trail must not change the run's outcome.
            warn!(error = %e, "failed to append run history entry");
        }
    }

    fn fail(
        &self,
        stage: FailedStage,
        record_count: usize,
        error: &UplinkError,
        source: RunSource,
    ) -> RunOutcome {
        let message = format!("{}: {}", stage, error);
        let error_detail = error.detail();
        error!(stage = %stage, source = %source, "upload run failed: {}", error);
        self.record_history(
            RunStatus::Failure,
            record_count,
            &message,
            error_detail.clone(),
            source,
        );
        RunOutcome::Failed {
            stage,
            record_count,
            message,
            error_detail,
        }
    }

    fn fail_no_data(&self, source: RunSource) -> RunOutcome {
        let message = format!("{}: no records to report for today", FailedStage::NoData);
        info!(source = %source, "upload run ended without data");
        self.record_history(RunStatus::Failure, 0, &message, None, source);
        RunOutcome::Failed {
            stage: FailedStage::NoData,
            record_count: 0,
            message,
            error_detail: None,
        }
    }

    /// Execute one full upload cycle. Non-reentrant: a trigger arriving
    /// while a run is in flight is refused, not queued.
    pub async fn run_once<A>(
        &self,
        api: &mut A,
        source: &dyn DataSource,
        api_config: &ApiConfig,
    ) -> RunOutcome
    where
        A: ReportApi + ?Sized,
    {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("upload trigger refused, a run is already in progress");
            return RunOutcome::Busy;
        };
        let tag = source.source();
        info!(source = %tag, "starting upload run");

        // Authenticating
        if let Err(e) = api.login(&api_config.username, &api_config.password).await {
            return self.fail(FailedStage::Auth, 0, &e, tag);
        }

        // Fetching
        let raw = match source.fetch().await {
            Ok(records) => records,
            Err(e) => return self.fail(FailedStage::Fetch, 0, &e, tag),
        };
        info!(count = raw.len(), "fetched records");

        // Validating
        let failures = validate_batch(&raw);
        if !failures.is_empty() {
            let count = raw.len();
            let e = UplinkError::Validation(failures);
            return self.fail(FailedStage::Validation, count, &e, tag);
        }
        if raw.is_empty() {
            return self.fail_no_data(tag);
        }

        let converted: Result<Vec<RetailRecord>, String> =
            raw.iter().map(RetailRecord::from_raw).collect();
        let records = match converted {
            Ok(records) => records,
            Err(reason) => {
                let e = UplinkError::Configuration(reason);
                return self.fail(FailedStage::Validation, raw.len(), &e, tag);
            }
        };

        // Uploading
        match api.upload(&records).await {
            Ok(receipt) => {
                let message = format!(
                    "uploaded {} record(s): {}",
                    records.len(),
                    receipt.summary()
                );
                info!(count = records.len(), source = %tag, "upload run succeeded");
                self.record_history(RunStatus::Success, records.len(), &message, None, tag);
                RunOutcome::Succeeded {
                    record_count: records.len(),
                    message,
                }
            }
            Err(e) => self.fail(FailedStage::Upload, records.len(), &e, tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use uplink_api_client::{protocol, UploadReceipt};
    use uplink_core::models::sample_raw;
    use uplink_core::{RawRecord, SchemaIssue};

    const LOGIN_OK: (u16, &str) = (200, r#"{"code":200,"token":"abc","msg":"ok"}"#);
    const LOGIN_REJECTED: (u16, &str) = (200, r#"{"code":401,"msg":"bad password"}"#);
    const UPLOAD_OK: (u16, &str) = (
        200,
        r#"{"code":200,"content":[{"soureId":"YN20250807000001","code":"200","msg":"ok"}]}"#,
    );
    const UPLOAD_REJECTED: (u16, &str) = (200, r#"{"code":500,"msg":"quota exceeded"}"#);

    /// Replays canned server responses through the real protocol
    /// interpretation, so orchestrator tests exercise the same error
    /// mapping as live runs.
    struct MockApi {
        login_body: (u16, &'static str),
        upload_body: (u16, &'static str),
        login_calls: usize,
        upload_calls: usize,
    }

    impl MockApi {
        fn new(login_body: (u16, &'static str), upload_body: (u16, &'static str)) -> Self {
            Self {
                login_body,
                upload_body,
                login_calls: 0,
                upload_calls: 0,
            }
        }
    }

    #[async_trait]
    impl ReportApi for MockApi {
        async fn login(&mut self, _username: &str, _password: &str) -> Result<(), UplinkError> {
            self.login_calls += 1;
            protocol::interpret_login(self.login_body.0, self.login_body.1).map(|_| ())
        }

        async fn upload(&mut self, records: &[RetailRecord]) -> Result<UploadReceipt, UplinkError> {
            self.upload_calls += 1;
            protocol::interpret_upload(self.upload_body.0, self.upload_body.1, records.len())
        }
    }

    enum Behavior {
        Records(Vec<RawRecord>),
        MissingTable(String),
        Slow(Duration),
    }

    struct MockSource {
        behavior: Behavior,
    }

    #[async_trait]
    impl DataSource for MockSource {
        async fn fetch(&self) -> Result<Vec<RawRecord>, UplinkError> {
            match &self.behavior {
                Behavior::Records(records) => Ok(records.clone()),
                Behavior::MissingTable(table) => {
                    Err(UplinkError::Schema(SchemaIssue::MissingTable(table.clone())))
                }
                Behavior::Slow(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(vec![sample_raw(1, 100.0)])
                }
            }
        }

        fn source(&self) -> RunSource {
            RunSource::Manual
        }
    }

    fn records_source(records: Vec<RawRecord>) -> MockSource {
        MockSource {
            behavior: Behavior::Records(records),
        }
    }

    fn api_config() -> ApiConfig {
        ApiConfig {
            base_url: "https://collect.example.gov".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            timeout_secs: 30,
            accept_invalid_certs: true,
        }
    }

    fn orchestrator() -> (tempfile::TempDir, UploadOrchestrator, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("history.json"));
        let orchestrator = UploadOrchestrator::new(history.clone());
        (dir, orchestrator, history)
    }

    #[tokio::test]
    async fn test_successful_run_appends_success_entry() {
        let (_dir, orchestrator, history) = orchestrator();
        let mut api = MockApi::new(LOGIN_OK, UPLOAD_OK);
        let source = records_source(vec![sample_raw(1, 100.0)]);

        let outcome = orchestrator.run_once(&mut api, &source, &api_config()).await;
        assert!(outcome.succeeded());
        assert_eq!(outcome.exit_code(), 0);

        let entries = history.load();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, RunStatus::Success);
        assert_eq!(entries[0].record_count, 1);
        assert_eq!(entries[0].source, RunSource::Manual);
    }

    #[tokio::test]
    async fn test_rejected_login_fails_auth_stage() {
        let (_dir, orchestrator, history) = orchestrator();
        let mut api = MockApi::new(LOGIN_REJECTED, UPLOAD_OK);
        let source = records_source(vec![sample_raw(1, 100.0)]);

        let outcome = orchestrator.run_once(&mut api, &source, &api_config()).await;
        match &outcome {
            RunOutcome::Failed { stage, message, .. } => {
                assert_eq!(*stage, FailedStage::Auth);
                assert!(message.contains("bad password"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(api.upload_calls, 0);

        let entries = history.load();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, RunStatus::Failure);
        assert!(entries[0].message.starts_with("auth:"));
    }

    #[tokio::test]
    async fn test_missing_table_fails_fetch_stage() {
        let (_dir, orchestrator, history) = orchestrator();
        let mut api = MockApi::new(LOGIN_OK, UPLOAD_OK);
        let source = MockSource {
            behavior: Behavior::MissingTable("retail_data".to_string()),
        };

        let outcome = orchestrator.run_once(&mut api, &source, &api_config()).await;
        match &outcome {
            RunOutcome::Failed { stage, message, .. } => {
                assert_eq!(*stage, FailedStage::Fetch);
                assert!(message.contains("retail_data"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(outcome.exit_code(), 3);
        assert_eq!(history.load().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_blocks_upload() {
        let (_dir, orchestrator, history) = orchestrator();
        let mut api = MockApi::new(LOGIN_OK, UPLOAD_OK);
        let source = records_source(vec![sample_raw(1, 100.0), sample_raw(3, -5.0)]);

        let outcome = orchestrator.run_once(&mut api, &source, &api_config()).await;
        match &outcome {
            RunOutcome::Failed {
                stage,
                record_count,
                error_detail,
                ..
            } => {
                assert_eq!(*stage, FailedStage::Validation);
                assert_eq!(*record_count, 2);
                assert!(error_detail
                    .as_deref()
                    .unwrap()
                    .contains("value cannot be negative"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(outcome.exit_code(), 4);
        assert_eq!(api.upload_calls, 0);
        assert!(history.load()[0].error_detail.is_some());
    }

    #[tokio::test]
    async fn test_empty_result_set_is_no_data_not_a_crash() {
        let (_dir, orchestrator, history) = orchestrator();
        let mut api = MockApi::new(LOGIN_OK, UPLOAD_OK);
        let source = records_source(Vec::new());

        let outcome = orchestrator.run_once(&mut api, &source, &api_config()).await;
        assert_eq!(outcome.exit_code(), 5);
        assert_eq!(api.upload_calls, 0);

        let entries = history.load();
        assert_eq!(entries[0].status, RunStatus::Failure);
        assert_eq!(entries[0].record_count, 0);
        assert!(entries[0].message.starts_with("no-data:"));
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_server_payload() {
        let (_dir, orchestrator, history) = orchestrator();
        let mut api = MockApi::new(LOGIN_OK, UPLOAD_REJECTED);
        let source = records_source(vec![sample_raw(1, 100.0)]);

        let outcome = orchestrator.run_once(&mut api, &source, &api_config()).await;
        match &outcome {
            RunOutcome::Failed {
                stage,
                error_detail,
                ..
            } => {
                assert_eq!(*stage, FailedStage::Upload);
                assert!(error_detail.as_deref().unwrap().contains("quota exceeded"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(outcome.exit_code(), 6);

        let entries = history.load();
        assert_eq!(entries[0].status, RunStatus::Failure);
        assert!(entries[0]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_refused_without_history() {
        let (_dir, orchestrator, history) = orchestrator();
        let mut first_api = MockApi::new(LOGIN_OK, UPLOAD_OK);
        let mut second_api = MockApi::new(LOGIN_OK, UPLOAD_OK);
        let slow = MockSource {
            behavior: Behavior::Slow(Duration::from_millis(100)),
        };
        let fast = records_source(vec![sample_raw(1, 100.0)]);

        let config = api_config();
        let (first, second) = tokio::join!(
            orchestrator.run_once(&mut first_api, &slow, &config),
            orchestrator.run_once(&mut second_api, &fast, &config),
        );

        assert!(first.succeeded());
        assert_eq!(second, RunOutcome::Busy);
        assert_eq!(second.exit_code(), 7);
        // Only the in-flight run leaves a trace.
        assert_eq!(history.load().len(), 1);
    }

    #[tokio::test]
    async fn test_run_lock_released_after_run() {
        let (_dir, orchestrator, history) = orchestrator();
        let config = api_config();
        for _ in 0..2 {
            let mut api = MockApi::new(LOGIN_OK, UPLOAD_OK);
            let source = records_source(vec![sample_raw(1, 100.0)]);
            let outcome = orchestrator.run_once(&mut api, &source, &config).await;
            assert!(outcome.succeeded());
        }
        assert_eq!(history.load().len(), 2);
    }
}
