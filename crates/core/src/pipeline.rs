//! One reconciliation run, driven as a forward-only state machine.
//!
//! ```text
//! Loading -> Reconciling -> Scanning -> ReportOnly ----------------> Done
//!                                    -> AwaitingConfirmation -> Applying -> Done
//! ```
//!
//! Any error moves the run to `Failed`; whatever was produced before the
//! failure (remappings, report) stays readable. The confirmation gate itself
//! belongs to the caller: after [`SyncPipeline::prepare`] it either calls
//! [`SyncPipeline::apply`] or [`SyncPipeline::decline`].

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::apply::{self, ApplySummary, IdModifier};
use crate::config::SyncConfig;
use crate::directory::DirectoryClient;
use crate::errors::CoreError;
use crate::models::{IdRemapping, LocalSnapshot, OwnershipReport, RemoteSnapshot, RunState};
use crate::reconcile::reconcile;
use crate::scanner::{self, ScanOptions};
use crate::snapshot::{load_local_snapshot, MembershipView};

/// Drives a single run from snapshot loading to apply.
pub struct SyncPipeline {
    config: SyncConfig,
    client: DirectoryClient,
    modifier: Option<Box<dyn IdModifier + Send>>,
    dry_run: bool,
    state: RunState,
    started_at: DateTime<Utc>,
    local: Option<LocalSnapshot>,
    remote: Option<RemoteSnapshot>,
    membership: Option<MembershipView>,
    remappings: Vec<IdRemapping>,
    report: Option<OwnershipReport>,
}

impl SyncPipeline {
    /// Build the pipeline. Fails early when the remote client cannot be
    /// constructed (e.g. no API key).
    pub fn new(
        config: SyncConfig,
        modifier: Box<dyn IdModifier + Send>,
        dry_run: bool,
    ) -> Result<Self, CoreError> {
        let client = DirectoryClient::new(&config.directory)?;
        info!(dry_run, "initializing sync pipeline");
        Ok(Self {
            config,
            client,
            modifier: Some(modifier),
            dry_run,
            state: RunState::Loading,
            started_at: Utc::now(),
            local: None,
            remote: None,
            membership: None,
            remappings: Vec::new(),
            report: None,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn remappings(&self) -> &[IdRemapping] {
        &self.remappings
    }

    pub fn membership(&self) -> Option<&MembershipView> {
        self.membership.as_ref()
    }

    /// The ownership report, if the scan got that far.
    pub fn report(&self) -> Option<&OwnershipReport> {
        self.report.as_ref()
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Fetch the remote snapshot, then read the local files. A remote
    /// failure aborts before any local work.
    pub async fn load(&mut self) -> Result<(), CoreError> {
        self.expect_state(RunState::Loading, "load snapshots")?;
        let result = self.do_load().await;
        self.track(result)?;
        self.state = RunState::Reconciling;
        Ok(())
    }

    async fn do_load(&mut self) -> Result<(), CoreError> {
        let remote = self.client.fetch_snapshot().await?;
        let local = load_local_snapshot(&self.config.local)?;
        let membership = MembershipView::build(&local);
        info!(
            local_users = local.users.len(),
            local_groups = local.groups.len(),
            remote_users = remote.users.len(),
            remote_groups = remote.groups.len(),
            "snapshots loaded"
        );
        self.remote = Some(remote);
        self.local = Some(local);
        self.membership = Some(membership);
        Ok(())
    }

    /// Cross-reference the snapshots.
    pub fn reconcile(&mut self) -> Result<&[IdRemapping], CoreError> {
        self.expect_state(RunState::Reconciling, "reconcile")?;
        let result = match (&self.local, &self.remote) {
            (Some(local), Some(remote)) => {
                reconcile(local, remote, &self.config.reconcile).map_err(CoreError::from)
            }
            _ => Err(CoreError::InvalidState {
                action: "reconcile",
                state: self.state,
            }),
        };
        self.remappings = self.track(result)?;
        self.state = RunState::Scanning;
        Ok(&self.remappings)
    }

    /// Walk the scan root on a blocking thread.
    pub async fn scan(&mut self) -> Result<&OwnershipReport, CoreError> {
        self.expect_state(RunState::Scanning, "scan")?;
        let root = self.config.local.scan_root.clone();
        let remappings = self.remappings.clone();
        let options = ScanOptions {
            one_file_system: self.config.local.one_file_system,
        };

        let result = match tokio::task::spawn_blocking(move || {
            scanner::scan(&root, &remappings, options)
        })
        .await
        {
            Ok(scan) => scan.map_err(CoreError::from),
            Err(e) => Err(CoreError::Task(e.to_string())),
        };
        let report = self.track(result)?;
        self.state = if self.dry_run {
            RunState::ReportOnly
        } else {
            RunState::AwaitingConfirmation
        };
        info!(state = %self.state, "scan finished");
        Ok(self.report.insert(report))
    }

    /// Run load, reconcile and scan back to back.
    pub async fn prepare(&mut self) -> Result<&OwnershipReport, CoreError> {
        self.load().await?;
        self.reconcile()?;
        self.scan().await
    }

    /// Operator declined at the confirmation gate.
    pub fn decline(&mut self) -> Result<(), CoreError> {
        self.expect_state(RunState::AwaitingConfirmation, "decline")?;
        info!("apply declined by operator");
        self.state = RunState::Done;
        Ok(())
    }

    /// Apply the report. In a dry run the modifier is never called.
    pub async fn apply(&mut self) -> Result<ApplySummary, CoreError> {
        if !matches!(self.state, RunState::ReportOnly | RunState::AwaitingConfirmation) {
            return Err(CoreError::InvalidState {
                action: "apply",
                state: self.state,
            });
        }
        let (Some(report), Some(mut modifier)) = (self.report.clone(), self.modifier.take()) else {
            return Err(CoreError::InvalidState {
                action: "apply",
                state: self.state,
            });
        };
        if !self.dry_run {
            self.state = RunState::Applying;
        }

        let dry_run = self.dry_run;
        let joined = tokio::task::spawn_blocking(move || {
            let summary = apply::apply(&report, modifier.as_mut(), dry_run);
            (summary, modifier)
        })
        .await;

        let summary = match joined {
            Ok((summary, modifier)) => {
                self.modifier = Some(modifier);
                summary
            }
            Err(e) => return self.track(Err(CoreError::Task(e.to_string()))),
        };
        self.state = RunState::Done;
        info!(
            applied = summary.applied.len(),
            failed = summary.failures.len(),
            elapsed_ms = (Utc::now() - self.started_at).num_milliseconds(),
            "run complete"
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn expect_state(&self, expected: RunState, action: &'static str) -> Result<(), CoreError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    /// Move to `Failed` on error.
    fn track<T>(&mut self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if let Err(e) = &result {
            error!(state = %self.state, error = %e, "run failed");
            self.state = RunState::Failed;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::SystemModifier;
    use crate::errors::RemoteError;

    fn config() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.directory.api_url = "http://127.0.0.1:9/v1/".into();
        config.directory.api_key = Some("test-token".into());
        config
    }

    #[test]
    fn test_missing_api_key_fails_construction() {
        let mut config = config();
        config.directory.api_key = None;
        let err = SyncPipeline::new(config, Box::new(SystemModifier), true)
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::Remote(RemoteError::MissingApiKey { .. })));
    }

    #[tokio::test]
    async fn test_steps_out_of_order_rejected() {
        let mut pipeline = SyncPipeline::new(config(), Box::new(SystemModifier), false).unwrap();
        assert_eq!(pipeline.state(), RunState::Loading);

        assert!(matches!(
            pipeline.scan().await,
            Err(CoreError::InvalidState { action: "scan", state: RunState::Loading })
        ));
        assert!(matches!(pipeline.apply().await, Err(CoreError::InvalidState { .. })));
        assert!(pipeline.decline().is_err());
        // Ordering mistakes are not run failures.
        assert_eq!(pipeline.state(), RunState::Loading);
        assert!(pipeline.report().is_none());
    }
}
