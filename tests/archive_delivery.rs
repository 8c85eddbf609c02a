mod common;

use std::path::Path;

use common::{ls_remote, Call, RecordingExecutor};
use limeship::context::TaskContext;
use limeship::interrupt::InterruptFlag;
use limeship::ssh::CommandOutput;
use limeship::tasks::{self, Registry, TaskReport};
use limeship::ErrorCode;

fn deploy(
    executor: &RecordingExecutor,
    interrupt: InterruptFlag,
    dir: &Path,
) -> limeship::Result<Vec<TaskReport>> {
    let project = common::project();
    let registry = Registry::new(project.environment_names())?;
    let invocations = registry.resolve_all(&["dev".to_string(), "deploy".to_string()])?;

    let mut env = project.seed();
    env.set("remote_deployment", false);
    let mut ctx = TaskContext::new(env, &project, executor, interrupt, dir);
    tasks::run(&mut ctx, &invocations)
}

fn leftover_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect()
}

#[test]
fn sync_mismatch_fails_before_any_upload() {
    let dir = tempfile::tempdir().unwrap();
    let executor = RecordingExecutor::new()
        .respond("git ls-remote", ls_remote("abc123"))
        .respond("git rev-parse", CommandOutput::ok("def456\n"));

    let err = deploy(&executor, InterruptFlag::manual(), dir.path()).unwrap_err();

    assert_eq!(err.code, ErrorCode::DeploySyncFailed);
    assert_eq!(err.details["remoteRev"], "abc123");
    assert_eq!(err.details["localRev"], "def456");
    assert!(err.message.contains("git@git.example.com:/projects/shop"));

    let calls = executor.calls();
    assert!(calls.iter().all(|c| matches!(c, Call::Local(_))));
    assert_eq!(executor.count("git archive"), 0);
    assert!(leftover_files(dir.path()).is_empty());
}

#[test]
fn unresolvable_local_branch_is_a_sync_error() {
    let dir = tempfile::tempdir().unwrap();
    let executor = RecordingExecutor::new()
        .respond("git ls-remote", ls_remote("abc123"))
        .respond("git rev-parse", CommandOutput::ok(""));

    let err = deploy(&executor, InterruptFlag::manual(), dir.path()).unwrap_err();

    assert_eq!(err.code, ErrorCode::DeploySyncFailed);
    assert!(!executor.calls().iter().any(|c| matches!(c, Call::Put(..))));
}

#[test]
fn matching_revisions_upload_and_remove_the_archive() {
    let dir = tempfile::tempdir().unwrap();
    let executor = RecordingExecutor::new()
        .respond("git ls-remote", ls_remote("abc123"))
        .respond("git rev-parse", CommandOutput::ok("abc123\n"));

    let reports = deploy(&executor, InterruptFlag::manual(), dir.path()).unwrap();
    let release = reports[1].data["release"].as_str().unwrap().to_string();

    let archive = format!("{}.tar.gz", release);
    let mkdir = executor.position("mkdir -p").unwrap();
    let put = executor
        .calls()
        .iter()
        .position(|c| matches!(c, Call::Put(..)))
        .unwrap();
    let unpack = executor.position("tar zmxf").unwrap();
    let remove = executor.position(&format!("rm -rf '/tmp/{}'", archive)).unwrap();

    assert!(executor.position("git archive").unwrap() < mkdir);
    assert!(mkdir < put && put < unpack && unpack < remove);
    assert!(executor.calls()[put]
        .command()
        .ends_with(&format!("/tmp/{}", archive)));
    assert!(leftover_files(dir.path()).is_empty());
}

#[test]
fn interrupt_during_upload_removes_the_partial_archive() {
    let dir = tempfile::tempdir().unwrap();
    let interrupt = InterruptFlag::manual();
    let executor = RecordingExecutor::new()
        .respond("git ls-remote", ls_remote("abc123"))
        .respond("git rev-parse", CommandOutput::ok("abc123\n"))
        .interrupt_on("put ", interrupt.clone());

    let err = deploy(&executor, interrupt, dir.path()).unwrap_err();

    assert_eq!(err.code, ErrorCode::DeployInterrupted);
    assert_eq!(err.details["stage"], "updating");
    assert!(err.details["removedArchive"]
        .as_str()
        .unwrap()
        .ends_with(".tar.gz"));
    assert!(leftover_files(dir.path()).is_empty());

    let calls = executor.calls();
    assert!(matches!(calls.last(), Some(Call::Put(..))), "nothing runs after the interrupt");
}

#[test]
fn interrupt_before_a_stage_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let interrupt = InterruptFlag::manual();
    let executor = RecordingExecutor::new()
        .respond("git ls-remote", ls_remote("abc123"))
        .respond("git rev-parse", CommandOutput::ok("abc123\n"))
        .interrupt_on("pip install", interrupt.clone());

    let err = deploy(&executor, interrupt, dir.path()).unwrap_err();

    assert_eq!(err.code, ErrorCode::DeployInterrupted);
    assert_eq!(err.details["stage"], "installing_deps");
    assert!(err.details.get("removedArchive").is_none());
    assert_eq!(executor.count("collectstatic"), 0);
    assert_eq!(executor.count("wsgi.py"), 0);
    assert!(leftover_files(dir.path()).is_empty());
}

#[test]
fn already_interrupted_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let interrupt = InterruptFlag::manual();
    interrupt.trigger();
    let executor = RecordingExecutor::new();

    let err = deploy(&executor, interrupt, dir.path()).unwrap_err();

    assert_eq!(err.code, ErrorCode::DeployInterrupted);
    assert!(executor.calls().is_empty());
}
