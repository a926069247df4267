//! End-to-end tests for a full reconciliation run.
//!
//! These tests exercise the real `SyncPipeline` with:
//! - A mocked remote directory (`httpmock`)
//! - Scratch passwd/group files and a scan tree in temp directories
//! - A recording ID modifier in place of `usermod`/`groupmod`/`lchown`
//!
//! Local records use the current process's UID/GID so files created by the
//! test are owned by a remapped ID without needing root.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use uidsync_core::apply::IdModifier;
use uidsync_core::config::SyncConfig;
use uidsync_core::errors::{ApplyError, CoreError, ReconcileError, RemoteError};
use uidsync_core::models::{EntityKind, RunState};
use uidsync_core::report::render_text;
use uidsync_core::SyncPipeline;

// ===========================================================================
// Helpers
// ===========================================================================

const REMOTE_OFFSET: u32 = 100_000;

fn current_ids() -> (u32, u32) {
    // SAFETY: geteuid/getegid cannot fail.
    unsafe { (libc::geteuid(), libc::getegid()) }
}

/// Shared call log so the test can inspect calls after the pipeline takes
/// ownership of the modifier.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
    fail_path: Option<PathBuf>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl IdModifier for Recorder {
    fn set_entity_id(&mut self, kind: EntityKind, name: &str, new_id: u32) -> Result<(), ApplyError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("id {kind} {name} {new_id}"));
        Ok(())
    }

    fn set_path_owner(&mut self, kind: EntityKind, path: &Path, id: u32) -> Result<(), ApplyError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("own {kind} {} {id}", path.display()));
        if self.fail_path.as_deref() == Some(path) {
            return Err(ApplyError::Chown {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        Ok(())
    }
}

struct Fixture {
    _etc: TempDir,
    tree: TempDir,
    config: SyncConfig,
}

/// Local files: `alice` with the current UID and `devs` with the current
/// GID, plus a local-only system account. Scan tree: `data/`,
/// `data/report.csv`, `notes.txt`.
fn fixture(server: &MockServer) -> Fixture {
    let (uid, gid) = current_ids();
    let etc = tempfile::tempdir().unwrap();
    let passwd = etc.path().join("passwd");
    let group = etc.path().join("group");
    fs::write(
        &passwd,
        format!(
            "# local accounts\n\
             daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin\n\
             alice:x:{uid}:{gid}:Alice:/home/alice:/bin/bash\n"
        ),
    )
    .unwrap();
    fs::write(&group, format!("daemon:x:1:\ndevs:x:{gid}:alice\n")).unwrap();

    let tree = tempfile::tempdir().unwrap();
    fs::create_dir(tree.path().join("data")).unwrap();
    fs::write(tree.path().join("data/report.csv"), "id,value\n").unwrap();
    fs::write(tree.path().join("notes.txt"), "hello").unwrap();

    let mut config = SyncConfig::default();
    config.directory.api_url = format!("{}/v1/", server.base_url());
    config.directory.api_key = Some("secret-token".into());
    config.directory.timeout_secs = 5;
    config.local.passwd_path = passwd;
    config.local.group_path = group;
    config.local.scan_root = tree.path().to_path_buf();
    config.reconcile.min_uid = uid;
    config.reconcile.min_gid = gid;

    Fixture {
        _etc: etc,
        tree,
        config,
    }
}

async fn mock_directory(server: &MockServer) {
    let (uid, gid) = current_ids();
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/users/");
            then.status(200).json_body(json!({"data": [
                {"username": "alice", "uid": uid + REMOTE_OFFSET, "email": "alice@example.com"},
                {"username": "carol", "uid": 4242}
            ]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/groups/");
            then.status(200)
                .json_body(json!({"data": [{"name": "devs", "gid": gid + REMOTE_OFFSET}]}));
        })
        .await;
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_full_run_remaps_and_reowns() {
    let server = MockServer::start_async().await;
    mock_directory(&server).await;
    let fx = fixture(&server);
    let (uid, gid) = current_ids();

    let recorder = Recorder::default();
    let mut pipeline =
        SyncPipeline::new(fx.config.clone(), Box::new(recorder.clone()), false).unwrap();

    let report = pipeline.prepare().await.unwrap().clone();
    assert_eq!(pipeline.state(), RunState::AwaitingConfirmation);

    let remaps: Vec<_> = pipeline
        .remappings()
        .iter()
        .map(|r| (r.kind, r.name.as_str(), r.old_id, r.new_id))
        .collect();
    assert_eq!(
        remaps,
        vec![
            (EntityKind::User, "alice", uid, uid + REMOTE_OFFSET),
            (EntityKind::Group, "devs", gid, gid + REMOTE_OFFSET),
        ]
    );

    let root = fx.tree.path();
    let expected = vec![root.join("data"), root.join("data/report.csv"), root.join("notes.txt")];
    assert_eq!(report.get(EntityKind::User, uid).unwrap().paths, expected);
    assert_eq!(report.get(EntityKind::Group, gid).unwrap().paths, expected);

    let membership = pipeline.membership().unwrap();
    let alice = membership.users.iter().find(|u| u.name == "alice").unwrap();
    assert_eq!(alice.member_of.len(), 1);
    assert_eq!(alice.member_of[0].name, "devs");

    let summary = pipeline.apply().await.unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.applied.len(), 2);
    assert_eq!(pipeline.state(), RunState::Done);

    let calls = recorder.calls();
    assert_eq!(calls.len(), 8);
    assert_eq!(calls[0], format!("id user alice {}", uid + REMOTE_OFFSET));
    assert_eq!(calls[4], format!("id group devs {}", gid + REMOTE_OFFSET));
}

#[tokio::test]
async fn test_dry_run_report_matches_live_and_makes_no_calls() {
    let server = MockServer::start_async().await;
    mock_directory(&server).await;
    let fx = fixture(&server);

    let live_recorder = Recorder::default();
    let mut live =
        SyncPipeline::new(fx.config.clone(), Box::new(live_recorder.clone()), false).unwrap();
    let live_report = render_text(live.prepare().await.unwrap());

    let dry_recorder = Recorder::default();
    let mut dry = SyncPipeline::new(fx.config.clone(), Box::new(dry_recorder.clone()), true).unwrap();
    let dry_report = render_text(dry.prepare().await.unwrap());
    assert_eq!(dry.state(), RunState::ReportOnly);

    assert_eq!(live_report, dry_report);

    let summary = dry.apply().await.unwrap();
    assert!(summary.dry_run);
    assert_eq!(summary.applied.len(), 2);
    assert!(dry_recorder.calls().is_empty());
    assert_eq!(dry.state(), RunState::Done);
}

#[tokio::test]
async fn test_declined_run_applies_nothing() {
    let server = MockServer::start_async().await;
    mock_directory(&server).await;
    let fx = fixture(&server);

    let recorder = Recorder::default();
    let mut pipeline = SyncPipeline::new(fx.config.clone(), Box::new(recorder.clone()), false).unwrap();
    pipeline.prepare().await.unwrap();
    pipeline.decline().unwrap();

    assert_eq!(pipeline.state(), RunState::Done);
    assert!(recorder.calls().is_empty());
    assert!(pipeline.apply().await.is_err());
}

#[tokio::test]
async fn test_remote_500_aborts_before_report() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/users/");
            then.status(500).body("internal error");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/groups/");
            then.status(200).json_body(json!({"data": []}));
        })
        .await;
    let fx = fixture(&server);

    let recorder = Recorder::default();
    let mut pipeline = SyncPipeline::new(fx.config.clone(), Box::new(recorder.clone()), false).unwrap();
    let err = pipeline.prepare().await.unwrap_err();

    assert!(matches!(
        err,
        CoreError::Remote(RemoteError::Status { status: 500, .. })
    ));
    assert_eq!(pipeline.state(), RunState::Failed);
    assert!(pipeline.report().is_none());
    assert!(pipeline.membership().is_none());
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn test_ambiguous_remote_name_fails_run() {
    let server = MockServer::start_async().await;
    let (uid, _) = current_ids();
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/users/");
            then.status(200).json_body(json!({"data": [
                {"username": "alice", "uid": uid + REMOTE_OFFSET},
                {"username": "alice", "uid": uid + REMOTE_OFFSET + 1}
            ]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/groups/");
            then.status(200).json_body(json!({"data": []}));
        })
        .await;
    let fx = fixture(&server);

    let mut pipeline = SyncPipeline::new(fx.config.clone(), Box::new(Recorder::default()), true).unwrap();
    let err = pipeline.prepare().await.unwrap_err();

    assert!(matches!(
        err,
        CoreError::Reconcile(ReconcileError::AmbiguousRemoteMatch { count: 2, .. })
    ));
    assert_eq!(pipeline.state(), RunState::Failed);
    assert!(pipeline.report().is_none());
}

#[tokio::test]
async fn test_failed_entity_rolls_back_while_others_apply() {
    let server = MockServer::start_async().await;
    mock_directory(&server).await;
    let fx = fixture(&server);
    let (uid, gid) = current_ids();
    let failing = fx.tree.path().join("data/report.csv");

    let recorder = Recorder {
        fail_path: Some(failing.clone()),
        ..Default::default()
    };
    let mut pipeline = SyncPipeline::new(fx.config.clone(), Box::new(recorder.clone()), false).unwrap();
    pipeline.prepare().await.unwrap();
    let summary = pipeline.apply().await.unwrap();

    // Both entities own report.csv, so both fail and roll back.
    assert_eq!(summary.failures.len(), 2);
    assert!(summary.failures.iter().all(|f| f.rolled_back));

    let calls = recorder.calls();
    let data = fx.tree.path().join("data");
    assert!(calls.contains(&format!("own user {} {uid}", data.display())));
    assert!(calls.contains(&format!("id user alice {uid}")));
    assert!(calls.contains(&format!("id group devs {gid}")));
    assert!(!calls.iter().any(|c| c.contains("notes.txt")));
}
