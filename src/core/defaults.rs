//! Built-in defaults seeded into every environment before project settings.
//!
//! Project globals and environment profiles override any of these. Derived
//! keys are only computed when the operator did not set them explicitly.

use crate::environment::Value;

/// Number of releases kept by cleanup when `keep_releases` is not set.
pub const KEEP_RELEASES: usize = 5;

/// Environment selected by the default task.
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Project configuration file looked up in the working directory.
pub const PROJECT_FILE: &str = "limeship.json";

/// Remote directory archives are uploaded to before unpacking.
pub const UPLOAD_DIR: &str = "/tmp";

pub fn base_values() -> Vec<(&'static str, Value)> {
    vec![
        ("vhosts_root", Value::from("/var/www/vhosts")),
        (
            "shared_dirs",
            Value::List(
                ["config", "media", "static", "releases/current", "releases/previous"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
        ),
        ("requirements_file", Value::from("requirements.txt")),
        ("remote_deployment", Value::Bool(default_remote_deployment())),
        ("local_repo_path", Value::from(".")),
        ("keep_releases", Value::from(KEEP_RELEASES.to_string())),
        (
            "static_command",
            Value::from("python manage.py collectstatic -v0 --noinput"),
        ),
        (
            "migrate_command",
            Value::from("python manage.py migrate --no-initial-data"),
        ),
        ("syncdb_command", Value::from("python manage.py syncdb -v0")),
        (
            "restart_command",
            Value::from("touch {{release_path}}/{{project_name}}/wsgi.py"),
        ),
        ("default_environment", Value::from(DEFAULT_ENVIRONMENT)),
    ]
}

/// Keys computed from other keys, in dependency order.
pub fn derived_templates() -> &'static [(&'static str, &'static str)] {
    &[
        ("repo", "git@{{git_host}}:/projects/{{project_name}}"),
        ("vhost_path", "{{vhosts_root}}/{{project_name}}.{{host_name}}"),
        ("release_path", "{{vhost_path}}/releases/current"),
        ("virtualenv", "{{project_name}}"),
        ("settings_module", "{{project_name}}.settings"),
    ]
}

/// Repository strategy when running on Linux, archive strategy elsewhere.
fn default_remote_deployment() -> bool {
    cfg!(target_os = "linux")
}
