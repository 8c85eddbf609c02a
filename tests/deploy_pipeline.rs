mod common;

use std::path::Path;

use common::{ls_remote, Call, RecordingExecutor};
use limeship::context::TaskContext;
use limeship::interrupt::InterruptFlag;
use limeship::ssh::CommandOutput;
use limeship::tasks::{self, Registry, TaskReport};
use limeship::ErrorCode;

fn run(
    executor: &RecordingExecutor,
    raws: &[&str],
    remote_deployment: bool,
    dir: &Path,
) -> limeship::Result<Vec<TaskReport>> {
    let project = common::project();
    let registry = Registry::new(project.environment_names())?;
    let raws: Vec<String> = raws.iter().map(|r| r.to_string()).collect();
    let invocations = registry.resolve_all(&raws)?;

    let mut env = project.seed();
    env.set("remote_deployment", remote_deployment);
    let mut ctx = TaskContext::new(env, &project, executor, InterruptFlag::manual(), dir);
    tasks::run(&mut ctx, &invocations)
}

fn repo_executor() -> RecordingExecutor {
    RecordingExecutor::new()
        .respond("git ls-remote", ls_remote("abc123"))
        .respond("ls -x", CommandOutput::ok("20240101000000  20240102000000\n"))
}

fn host_commands(executor: &RecordingExecutor, host: &str) -> Vec<String> {
    executor
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Remote(h, c) if h == host => Some(c),
            _ => None,
        })
        .collect()
}

#[test]
fn migration_never_runs_without_the_flag() {
    let dir = tempfile::tempdir().unwrap();
    let executor = repo_executor();

    run(&executor, &["prod", "deploy"], true, dir.path()).unwrap();

    assert_eq!(executor.count("manage.py migrate"), 0);
    assert_eq!(executor.count("wsgi.py"), 2);
}

#[test]
fn migration_runs_once_after_cleanup_and_before_hook() {
    let dir = tempfile::tempdir().unwrap();
    let executor = repo_executor();

    run(&executor, &["prod", "deploy:migrate"], true, dir.path()).unwrap();

    for host in ["deploy@web1", "deploy@web2"] {
        let commands = host_commands(&executor, host);
        let position = |pattern: &str| commands.iter().position(|c| c.contains(pattern));
        let last = |pattern: &str| commands.iter().rposition(|c| c.contains(pattern));

        let migrate = position("manage.py migrate").expect("migrate ran");
        assert_eq!(
            commands.iter().filter(|c| c.contains("manage.py migrate")).count(),
            1
        );
        assert!(last("readlink").unwrap() < migrate, "cleanup precedes migrate");
        assert!(migrate < position("clear_cache").unwrap(), "hook follows migrate");
        assert!(position("clear_cache").unwrap() < position("wsgi.py").unwrap());
    }
}

#[test]
fn stages_run_in_pipeline_order() {
    let dir = tempfile::tempdir().unwrap();
    let executor = repo_executor();

    run(&executor, &["dev", "deploy"], true, dir.path()).unwrap();

    let order = [
        "git ls-remote",
        "git fetch -q origin",
        "cp -RPp",
        "mv -f releases/current releases/previous",
        "local_settings.py",
        "pip install -r requirements.txt",
        "collectstatic",
        "ls -x",
        "clear_cache",
        "wsgi.py",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|p| executor.position(p).unwrap_or_else(|| panic!("missing {}", p)))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);
}

#[test]
fn every_host_receives_the_same_release() {
    let dir = tempfile::tempdir().unwrap();
    let executor = repo_executor();

    let reports = run(&executor, &["prod", "deploy"], true, dir.path()).unwrap();

    let deploys: Vec<&TaskReport> = reports.iter().filter(|r| r.task == "deploy").collect();
    assert_eq!(deploys.len(), 2);
    assert_eq!(deploys[0].data["release"], deploys[1].data["release"]);
    assert_eq!(deploys[0].data["rev"], "abc123");

    let copies: Vec<String> = executor
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("cp -RPp"))
        .collect();
    assert_eq!(copies.len(), 2);
    assert_eq!(copies[0], copies[1]);
}

#[test]
fn failed_step_stops_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let executor = repo_executor().respond(
        "pip install",
        CommandOutput::failed(1, "No matching distribution found"),
    );

    let err = run(&executor, &["prod", "deploy"], true, dir.path()).unwrap_err();

    assert_eq!(err.code, ErrorCode::RemoteCommandFailed);
    assert_eq!(err.details["host"], "deploy@web1");
    assert_eq!(executor.count("collectstatic"), 0);
    assert_eq!(executor.count("wsgi.py"), 0);
    assert!(host_commands(&executor, "deploy@web2").is_empty());
}

#[test]
fn deploy_requires_an_environment() {
    let dir = tempfile::tempdir().unwrap();
    let executor = repo_executor();

    let err = run(&executor, &["deploy"], true, dir.path()).unwrap_err();

    assert_eq!(err.code, ErrorCode::ConfigMissingKey);
    assert!(executor.calls().is_empty());
}

#[test]
fn default_task_deploys_to_dev() {
    let dir = tempfile::tempdir().unwrap();
    let executor = repo_executor();

    let reports = run(&executor, &[], true, dir.path()).unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].task, "deploy_to_dev_server");
    assert_eq!(reports[0].data["environment"], "dev");
    assert!(executor
        .calls()
        .iter()
        .all(|c| !matches!(c, Call::Remote(h, _) if h != "deploy@dev.example.com")));
}

#[test]
fn unknown_task_fails_before_anything_runs() {
    let dir = tempfile::tempdir().unwrap();
    let executor = repo_executor();

    let err = run(&executor, &["prod", "deploy", "rolback"], true, dir.path()).unwrap_err();

    assert_eq!(err.code, ErrorCode::TaskNotFound);
    assert!(executor.calls().is_empty());
}

#[test]
fn missing_stage_keys_fail_before_any_remote_action() {
    let dir = tempfile::tempdir().unwrap();
    let executor = repo_executor();
    let project = limeship::project::ProjectConfig::parse(
        r#"{
            "environments": {
                "dev": {
                    "user": "deploy",
                    "branch": "develop",
                    "hosts": ["dev.example.com"],
                    "host_name": "dev.example.com",
                    "vhost_path": "/srv/shop",
                    "repo": "git@git.example.com:/projects/shop",
                    "virtualenv": "shop",
                    "settings_module": "shop.settings"
                }
            }
        }"#,
        "limeship.json",
    )
    .unwrap();
    let registry = Registry::new(project.environment_names()).unwrap();
    let invocations = registry
        .resolve_all(&["dev".to_string(), "deploy".to_string()])
        .unwrap();

    let mut env = project.seed();
    env.set("remote_deployment", true);
    let mut ctx = TaskContext::new(env, &project, &executor, InterruptFlag::manual(), dir.path());
    let err = tasks::run(&mut ctx, &invocations).unwrap_err();

    assert_eq!(err.code, ErrorCode::ConfigMissingKey);
    assert_eq!(err.details["keys"], serde_json::json!(["project_name"]));
    assert!(executor.calls().is_empty());
}

#[test]
fn blank_migrate_command_only_matters_when_migrating() {
    let dir = tempfile::tempdir().unwrap();
    let project = common::project();
    let registry = Registry::new(project.environment_names()).unwrap();

    for (task, fails) in [("deploy", false), ("deploy:migrate", true)] {
        let executor = repo_executor();
        let invocations = registry
            .resolve_all(&["dev".to_string(), task.to_string()])
            .unwrap();
        let mut env = project.seed();
        env.set("remote_deployment", true);
        env.set("migrate_command", "");
        let mut ctx =
            TaskContext::new(env, &project, &executor, InterruptFlag::manual(), dir.path());

        let result = tasks::run(&mut ctx, &invocations);

        if fails {
            let err = result.err().unwrap();
            assert_eq!(err.code, ErrorCode::ConfigMissingKey);
            assert_eq!(err.details["keys"], serde_json::json!(["migrate_command"]));
            assert!(executor.calls().is_empty());
        } else {
            assert!(result.is_ok());
        }
    }
}
