//! Task registry and runner.
//!
//! Tasks are invoked as `name[:arg1,arg2]`. The built-in table is static;
//! every environment in the project file adds a selection task of the same
//! name. All invocations are resolved before the first one runs, so an
//! unknown name or a bad argument count fails at startup.
//!
//! Host-scoped tasks run once per configured host, one host at a time, in
//! the configured order. A failure on any host stops the run.

use serde::Serialize;
use serde_json::{json, Value};

use crate::cleanup;
use crate::commands;
use crate::context::TaskContext;
use crate::defaults;
use crate::delivery;
use crate::deploy::{self, steps, DeployOptions};
use crate::error::{Error, Result};
use crate::hooks;
use crate::release;
use crate::rollback;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Runs once, on the local machine.
    Local,
    /// Runs once per host.
    Hosts,
}

pub type Handler = fn(&mut TaskContext, &[String]) -> Result<Value>;

/// One-time setup before the host loop.
pub type Prepare = fn(&mut TaskContext, &[String]) -> Result<()>;

pub struct TaskDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub help: &'static str,
    pub scope: Scope,
    pub default: bool,
    /// Accepted positional arguments, for help and count checks.
    pub args: &'static [&'static str],
    pub min_args: usize,
    pub prepare: Option<Prepare>,
    pub handler: Handler,
}

impl TaskDef {
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }
}

pub static TASKS: &[TaskDef] = &[
    TaskDef {
        name: "deploy_to_dev_server",
        aliases: &[],
        help: "Select the default environment and deploy",
        scope: Scope::Local,
        default: true,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: deploy_to_dev_server,
    },
    TaskDef {
        name: "setup",
        aliases: &["up"],
        help: "Initial deployment setup",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: setup,
    },
    TaskDef {
        name: "deploy",
        aliases: &["dep"],
        help: "Deploy the configured branch as a new release and restart",
        scope: Scope::Hosts,
        default: false,
        args: &["migrate"],
        min_args: 0,
        prepare: Some(prepare_deploy),
        handler: deploy,
    },
    TaskDef {
        name: "after_deploy",
        aliases: &[],
        help: "Run the after_deploy hooks in the release virtualenv",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: after_deploy,
    },
    TaskDef {
        name: "deploy_version",
        aliases: &[],
        help: "Make an existing release live",
        scope: Scope::Hosts,
        default: false,
        args: &["version"],
        min_args: 1,
        prepare: None,
        handler: deploy_version,
    },
    TaskDef {
        name: "rollback",
        aliases: &[],
        help: "Swap the current and previous releases",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: rollback,
    },
    TaskDef {
        name: "releases",
        aliases: &[],
        help: "List releases and the current/previous links",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: releases,
    },
    TaskDef {
        name: "update_code",
        aliases: &[],
        help: "Deliver the release code using the configured strategy",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: update_code,
    },
    TaskDef {
        name: "update_code_from_repo",
        aliases: &[],
        help: "Deliver the release code from the repository on the host",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: update_code_from_repo,
    },
    TaskDef {
        name: "update_code_from_archive",
        aliases: &[],
        help: "Deliver the release code as an archive of the local clone",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: update_code_from_archive,
    },
    TaskDef {
        name: "install_requirements",
        aliases: &[],
        help: "Install the requirements file with pip",
        scope: Scope::Hosts,
        default: false,
        args: &["upgrade"],
        min_args: 0,
        prepare: None,
        handler: install_requirements,
    },
    TaskDef {
        name: "symlink_current_release",
        aliases: &[],
        help: "Link the release as current",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: symlink_current_release,
    },
    TaskDef {
        name: "collect_static_files",
        aliases: &[],
        help: "Collect static files",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: collect_static_files,
    },
    TaskDef {
        name: "syncdb",
        aliases: &[],
        help: "Create database tables",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: syncdb,
    },
    TaskDef {
        name: "migrate",
        aliases: &[],
        help: "Migrate the database",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: migrate,
    },
    TaskDef {
        name: "cleanup",
        aliases: &[],
        help: "Delete old releases",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: cleanup,
    },
    TaskDef {
        name: "debug",
        aliases: &[],
        help: "Toggle DEBUG in local_settings.py (on|off)",
        scope: Scope::Hosts,
        default: false,
        args: &["on|off"],
        min_args: 0,
        prepare: None,
        handler: debug,
    },
    TaskDef {
        name: "restart_webserver",
        aliases: &["restart"],
        help: "Restart the web server",
        scope: Scope::Hosts,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: restart_webserver,
    },
    TaskDef {
        name: "clean",
        aliases: &[],
        help: "Delete compiled Python files locally",
        scope: Scope::Local,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: clean,
    },
    TaskDef {
        name: "publish",
        aliases: &[],
        help: "Run the publish commands locally",
        scope: Scope::Local,
        default: false,
        args: &[],
        min_args: 0,
        prepare: None,
        handler: publish,
    },
];

pub fn find(name: &str) -> Option<&'static TaskDef> {
    TASKS.iter().find(|def| def.matches(name))
}

pub fn default_task() -> Option<&'static TaskDef> {
    TASKS.iter().find(|def| def.default)
}

/// Split `name:arg1,arg2` into the name and its arguments.
pub fn parse_invocation(raw: &str) -> (String, Vec<String>) {
    match raw.split_once(':') {
        Some((name, args)) => (
            name.trim().to_string(),
            args.split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        None => (raw.trim().to_string(), Vec::new()),
    }
}

#[derive(Clone)]
pub enum TaskKind {
    Builtin(&'static TaskDef),
    Environment,
}

/// A resolved invocation, ready to run.
#[derive(Clone)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
    pub kind: TaskKind,
}

impl Invocation {
    pub fn builtin(def: &'static TaskDef, args: Vec<String>) -> Self {
        Self {
            name: def.name.to_string(),
            args,
            kind: TaskKind::Builtin(def),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub help: String,
    pub scope: Scope,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

/// Built-in tasks plus the project's environment-selection tasks.
pub struct Registry {
    environments: Vec<String>,
}

impl Registry {
    pub fn new(environments: Vec<String>) -> Result<Self> {
        for name in &environments {
            if find(name).is_some() {
                return Err(Error::config_invalid_value(
                    format!("environments.{}", name),
                    Some(name.clone()),
                    "environment name collides with a built-in task",
                ));
            }
        }
        Ok(Self { environments })
    }

    pub fn names(&self) -> Vec<String> {
        TASKS
            .iter()
            .flat_map(|def| std::iter::once(def.name).chain(def.aliases.iter().copied()))
            .map(str::to_string)
            .chain(self.environments.iter().cloned())
            .collect()
    }

    pub fn resolve(&self, raw: &str) -> Result<Invocation> {
        let (name, args) = parse_invocation(raw);

        if self.environments.contains(&name) {
            if !args.is_empty() {
                return Err(too_many_args(&name, &[], &args));
            }
            return Ok(Invocation {
                name,
                args,
                kind: TaskKind::Environment,
            });
        }

        let def = find(&name).ok_or_else(|| Error::task_not_found(&name, self.names()))?;
        if args.len() > def.args.len() {
            return Err(too_many_args(def.name, def.args, &args));
        }
        if args.len() < def.min_args {
            return Err(Error::validation_missing_argument(
                def.args[args.len()..def.min_args]
                    .iter()
                    .map(|a| format!("{}:{}", def.name, a))
                    .collect(),
            ));
        }
        Ok(Invocation::builtin(def, args))
    }

    /// Resolve every invocation up front; no invocations means the default
    /// task.
    pub fn resolve_all(&self, raws: &[String]) -> Result<Vec<Invocation>> {
        if raws.is_empty() {
            let def = default_task()
                .ok_or_else(|| Error::internal_unexpected("no default task registered"))?;
            return Ok(vec![Invocation::builtin(def, Vec::new())]);
        }
        raws.iter().map(|raw| self.resolve(raw)).collect()
    }

    pub fn describe(&self) -> Vec<TaskInfo> {
        let builtin = TASKS.iter().map(|def| TaskInfo {
            name: def.name.to_string(),
            aliases: def.aliases.iter().map(|a| a.to_string()).collect(),
            help: def.help.to_string(),
            scope: def.scope,
            args: def.args.iter().map(|a| a.to_string()).collect(),
            default: def.default,
        });
        let environments = self.environments.iter().map(|name| TaskInfo {
            name: name.clone(),
            aliases: Vec::new(),
            help: format!("Select the '{}' environment", name),
            scope: Scope::Local,
            args: Vec::new(),
            default: false,
        });
        builtin.chain(environments).collect()
    }
}

fn too_many_args(task: &str, accepted: &[&str], args: &[String]) -> Error {
    Error::validation_invalid_argument(
        task,
        format!(
            "Task '{}' takes at most {} argument(s), got {}",
            task,
            accepted.len(),
            args.len()
        ),
        Some(args.join(",")),
        Some(accepted.iter().map(|a| a.to_string()).collect()),
    )
}

/// Output of one task on one host (or once, for local tasks).
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub data: Value,
}

/// Run invocations in order, stopping at the first error.
pub fn run(ctx: &mut TaskContext, invocations: &[Invocation]) -> Result<Vec<TaskReport>> {
    let mut reports = Vec::new();
    for invocation in invocations {
        reports.extend(execute(ctx, invocation)?);
    }
    Ok(reports)
}

pub fn execute(ctx: &mut TaskContext, invocation: &Invocation) -> Result<Vec<TaskReport>> {
    let def = match invocation.kind {
        TaskKind::Environment => {
            let project = ctx.project;
            project.select(&invocation.name, &mut ctx.env)?;
            log_status!("env", "Selected environment '{}'", invocation.name);
            return Ok(vec![TaskReport {
                task: invocation.name.clone(),
                host: None,
                data: json!({ "environment": invocation.name }),
            }]);
        }
        TaskKind::Builtin(def) => def,
    };

    if let Some(prepare) = def.prepare {
        prepare(ctx, &invocation.args)?;
    }

    match def.scope {
        Scope::Local => {
            let data = (def.handler)(ctx, &invocation.args)?;
            Ok(vec![TaskReport {
                task: def.name.to_string(),
                host: None,
                data,
            }])
        }
        Scope::Hosts => {
            let mut reports = Vec::new();
            for host in ctx.hosts()? {
                let label = host.to_string();
                ctx.set_host(Some(host));
                let result = (def.handler)(ctx, &invocation.args);
                ctx.set_host(None);

                reports.push(TaskReport {
                    task: def.name.to_string(),
                    host: Some(label),
                    data: result?,
                });
            }
            Ok(reports)
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::internal_json(e.to_string(), None))
}

fn first_arg(args: &[String]) -> Option<&str> {
    args.first().map(String::as_str)
}

fn deploy_to_dev_server(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    let environment = ctx
        .env
        .str("default_environment")
        .unwrap_or(defaults::DEFAULT_ENVIRONMENT)
        .to_string();
    let project = ctx.project;
    project.select(&environment, &mut ctx.env)?;

    let def = find("deploy").ok_or_else(|| Error::internal_unexpected("deploy task missing"))?;
    let reports = execute(ctx, &Invocation::builtin(def, Vec::new()))?;
    Ok(json!({ "environment": environment, "deploy": to_json(&reports)? }))
}

fn setup(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    ctx.run(&commands::mkvirtualenv(&ctx.env)?)?;
    ctx.run(&commands::make_shared_dirs(&ctx.env)?)?;
    Ok(json!({
        "virtualenv": ctx.env.str("virtualenv"),
        "shared_dirs": ctx.env.list("shared_dirs"),
    }))
}

fn prepare_deploy(ctx: &mut TaskContext, args: &[String]) -> Result<()> {
    let options = DeployOptions::from_args(args)?;
    deploy::prepare(ctx, options).map(|_| ())
}

fn deploy(ctx: &mut TaskContext, args: &[String]) -> Result<Value> {
    let options = DeployOptions::from_args(args)?;
    to_json(&deploy::run(ctx, options)?)
}

fn after_deploy(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    to_json(&hooks::run_after_deploy(ctx)?)
}

fn deploy_version(ctx: &mut TaskContext, args: &[String]) -> Result<Value> {
    let version = first_arg(args)
        .ok_or_else(|| Error::validation_missing_argument(vec!["version".to_string()]))?;
    to_json(&rollback::deploy_version(ctx, version)?)
}

fn rollback(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    to_json(&rollback::rollback(ctx)?)
}

fn releases(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    to_json(&release::inspect(ctx)?)
}

/// Run a delivery strategy outside the pipeline; a failed archive run still
/// removes its local archive.
fn deliver(ctx: &mut TaskContext, strategy: fn(&mut TaskContext) -> Result<String>) -> Result<Value> {
    let release = delivery::current_release(ctx)?;
    match strategy(ctx) {
        Ok(rev) => Ok(json!({ "release": release, "rev": rev })),
        Err(err) => {
            ctx.remove_artifacts();
            Err(err)
        }
    }
}

fn update_code(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    deliver(ctx, delivery::update)
}

fn update_code_from_repo(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    deliver(ctx, delivery::update_from_repo)
}

fn update_code_from_archive(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    deliver(ctx, delivery::update_from_archive)
}

fn install_requirements(ctx: &mut TaskContext, args: &[String]) -> Result<Value> {
    let upgrade = match first_arg(args) {
        None => false,
        Some("upgrade") => true,
        Some(other) => {
            return Err(Error::validation_invalid_argument(
                "install_requirements",
                format!("Unknown argument '{}'", other),
                Some(other.to_string()),
                Some(vec!["upgrade".to_string()]),
            ))
        }
    };
    steps::install_requirements(ctx, upgrade)?;
    Ok(json!({ "upgrade": upgrade }))
}

fn symlink_current_release(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    steps::symlink_current_release(ctx)?;
    Ok(json!({ "current": ctx.env.str("release") }))
}

fn collect_static_files(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    steps::collect_static_files(ctx)?;
    Ok(Value::Null)
}

fn syncdb(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    steps::syncdb(ctx)?;
    Ok(Value::Null)
}

fn migrate(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    steps::migrate(ctx)?;
    Ok(Value::Null)
}

fn cleanup(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    to_json(&cleanup::run(ctx)?)
}

fn debug(ctx: &mut TaskContext, args: &[String]) -> Result<Value> {
    let on = match first_arg(args).unwrap_or("on") {
        "on" => true,
        "off" => false,
        other => {
            return Err(Error::validation_invalid_argument(
                "debug",
                format!("Expected 'on' or 'off', got '{}'", other),
                Some(other.to_string()),
                Some(vec!["on".to_string(), "off".to_string()]),
            ))
        }
    };
    ctx.run(&commands::toggle_debug(&ctx.env, on)?)?;
    steps::restart_webserver(ctx)?;
    Ok(json!({ "debug": on }))
}

fn restart_webserver(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    steps::restart_webserver(ctx)?;
    Ok(Value::Null)
}

fn clean(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    ctx.local(&commands::remove_bytecode())?;
    Ok(json!({ "path": ctx.local_dir().display().to_string() }))
}

fn publish(ctx: &mut TaskContext, _args: &[String]) -> Result<Value> {
    to_json(&hooks::run_publish(ctx)?)
}
