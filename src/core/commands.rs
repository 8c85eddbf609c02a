//! Typed shell command builders.
//!
//! Every builder reads the keys it needs from the [`Environment`] and fails
//! with a configuration error before producing a command when one is
//! missing. Paths are always quoted; configurable command templates are
//! rendered strictly.

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::release::{ReleaseId, CURRENT, PREVIOUS, SWAP};
use crate::utils::shell::{and_then, quote_arg, quote_path, quote_paths};

const CACHED_COPY: &str = "cached-copy";
const LOCAL_SETTINGS: &str = "config/local_settings.py";

/// `<vhost_path>/releases`
pub fn releases_dir(env: &Environment) -> Result<String> {
    Ok(format!("{}/releases", env.require_str("vhost_path")?))
}

pub fn release_dir(env: &Environment, release: &ReleaseId) -> Result<String> {
    Ok(format!("{}/{}", releases_dir(env)?, release))
}

pub fn cached_copy_dir(env: &Environment) -> Result<String> {
    Ok(format!("{}/{}", env.require_str("vhost_path")?, CACHED_COPY))
}

pub fn local_settings_file(env: &Environment) -> Result<String> {
    Ok(format!("{}/{}", env.require_str("vhost_path")?, LOCAL_SETTINGS))
}

/// Run `command` inside the project's virtualenv from the live release.
pub fn in_venv(env: &Environment, command: &str) -> Result<String> {
    let release_path = env.require_str("release_path")?;
    let settings_module = env.require_str("settings_module")?;
    let virtualenv = env.require_str("virtualenv")?;

    Ok(and_then(&[
        format!("cd {}", quote_path(release_path)),
        format!("export DJANGO_SETTINGS_MODULE={}", quote_arg(settings_module)),
        format!("workon {}", quote_arg(virtualenv)),
        command.to_string(),
    ]))
}

/// Render a configurable command template (e.g. `static_command`) and wrap
/// it in the virtualenv.
pub fn configured_in_venv(env: &Environment, key: &str) -> Result<String> {
    let template = env.require_str(key)?;
    in_venv(env, &env.render(template)?)
}

pub fn mkvirtualenv(env: &Environment) -> Result<String> {
    Ok(format!("mkvirtualenv {}", quote_arg(env.require_str("virtualenv")?)))
}

pub fn make_shared_dirs(env: &Environment) -> Result<String> {
    let vhost_path = env.require_str("vhost_path")?;
    let dirs = env.list("shared_dirs");
    if dirs.is_empty() {
        return Err(Error::config_missing_key("shared_dirs"));
    }

    Ok(and_then(&[
        format!("cd {}", quote_path(vhost_path)),
        format!("mkdir -p {}", quote_paths(&dirs)),
    ]))
}

/// Local: resolve the branch head on the remote repository.
pub fn ls_remote(env: &Environment) -> Result<String> {
    env.require(&["repo", "branch"])?;
    Ok(format!(
        "git ls-remote {} {}",
        quote_arg(env.require_str("repo")?),
        quote_arg(env.require_str("branch")?)
    ))
}

/// Local: resolve the branch in the local clone.
pub fn rev_parse(env: &Environment) -> Result<String> {
    Ok(format!(
        "git rev-parse --revs-only {}",
        quote_arg(env.require_str("branch")?)
    ))
}

/// Remote: bring the persistent clone to `rev`, cloning it on first use.
pub fn refresh_cached_copy(env: &Environment, rev: &str) -> Result<String> {
    let repo = env.require_str("repo")?;
    let cached = quote_path(&cached_copy_dir(env)?);
    let rev = quote_arg(rev);

    let refresh = and_then(&[
        format!("cd {}", cached),
        "git fetch -q origin".to_string(),
        format!("git reset -q --hard {}", rev),
        "git clean -q -d -x -f".to_string(),
    ]);
    let clone = and_then(&[
        format!("git clone -q {} {}", quote_arg(repo), cached),
        format!("cd {}", cached),
        format!("git checkout -q -b deploy {}", rev),
    ]);

    Ok(format!(
        "if [ -d {} ]; then {}; else {}; fi",
        cached, refresh, clone
    ))
}

/// Remote: copy the persistent clone into a fresh release directory.
pub fn copy_cached_copy(env: &Environment, release: &ReleaseId) -> Result<String> {
    Ok(format!(
        "cp -RPp {} {}",
        quote_path(&cached_copy_dir(env)?),
        quote_path(&release_dir(env, release)?)
    ))
}

/// Local: archive the branch into `<release>.tar.gz`.
pub fn git_archive(env: &Environment, release: &ReleaseId) -> Result<String> {
    Ok(format!(
        "git archive --format=tar.gz {} -o {}",
        quote_arg(env.require_str("branch")?),
        quote_path(&release.archive_name())
    ))
}

pub fn make_release_dir(env: &Environment, release: &ReleaseId) -> Result<String> {
    Ok(format!("mkdir -p {}", quote_path(&release_dir(env, release)?)))
}

/// Remote: unpack an uploaded archive into the release directory.
pub fn unpack_archive(env: &Environment, release: &ReleaseId, archive: &str) -> Result<String> {
    Ok(and_then(&[
        format!("cd {}", quote_path(&release_dir(env, release)?)),
        format!("tar zmxf {}", quote_path(archive)),
    ]))
}

pub fn remove_path(path: &str) -> String {
    format!("rm -rf {}", quote_path(path))
}

/// Remote: retire `previous`, demote `current` and link `target` as current.
///
/// `target` is a release directory name relative to `releases/`. A missing
/// `current` (first deploy) is not an error.
pub fn activate_release(env: &Environment, target: &str) -> Result<String> {
    let vhost_path = env.require_str("vhost_path")?;
    let current = format!("releases/{}", CURRENT);
    let previous = format!("releases/{}", PREVIOUS);

    Ok(and_then(&[
        format!("cd {}", quote_path(vhost_path)),
        format!("rm -rf {}", previous),
        format!(
            "if [ -e {c} ] || [ -L {c} ]; then mv -f {c} {p}; fi",
            c = current,
            p = previous
        ),
        format!("ln -s {} {}", quote_arg(target), current),
    ]))
}

/// Remote: link the shared `local_settings.py` into the live release.
pub fn link_local_settings(env: &Environment) -> Result<String> {
    let release_path = env.require_str("release_path")?;
    let project_name = env.require_str("project_name")?;

    Ok(format!(
        "ln -nfs {} {}",
        quote_path(&local_settings_file(env)?),
        quote_path(&format!("{}/{}/local_settings.py", release_path, project_name))
    ))
}

/// Remote: swap `current` and `previous` through a temporary name so
/// `current` is only missing between two renames.
pub fn swap_links(env: &Environment) -> Result<String> {
    let vhost_path = env.require_str("vhost_path")?;
    let link = |name: &str| format!("releases/{}", name);

    Ok(and_then(&[
        format!("cd {}", quote_path(vhost_path)),
        format!("mv -f {} {}", link(CURRENT), link(SWAP)),
        format!("mv -f {} {}", link(PREVIOUS), link(CURRENT)),
        format!("mv -f {} {}", link(SWAP), link(PREVIOUS)),
    ]))
}

pub fn pip_install(env: &Environment, upgrade: bool) -> Result<String> {
    let mut command = format!(
        "pip install -r {}",
        quote_arg(env.require_str("requirements_file")?)
    );
    if upgrade {
        command.push_str(" --upgrade");
    }
    in_venv(env, &command)
}

pub fn list_releases(env: &Environment) -> Result<String> {
    Ok(format!("ls -x {}", quote_path(&releases_dir(env)?)))
}

/// Remote: print a link target, or nothing when the link is absent.
pub fn read_link(env: &Environment, name: &str) -> Result<String> {
    Ok(format!(
        "readlink {} || true",
        quote_path(&format!("{}/{}", releases_dir(env)?, name))
    ))
}

/// Remote: delete the named release directories with a single `rm -rf`.
pub fn remove_releases(env: &Environment, releases: &[String]) -> Result<String> {
    let dirs = releases_dir(env)?;
    let paths: Vec<String> = releases.iter().map(|r| format!("{}/{}", dirs, r)).collect();
    Ok(format!("rm -rf {}", quote_paths(&paths)))
}

/// Remote: uncomment (`on`) or comment (`off`) `DEBUG` in local settings.
pub fn toggle_debug(env: &Environment, on: bool) -> Result<String> {
    let expression = if on {
        r"s/^([[:space:]]*)#[[:space:]]?(DEBUG)/\1\2/"
    } else {
        r"s/^(DEBUG)/#\1/"
    };

    Ok(format!(
        "sed -i -E {} {}",
        quote_path(expression),
        quote_path(&local_settings_file(env)?)
    ))
}

pub fn restart(env: &Environment) -> Result<String> {
    env.render_shell(env.require_str("restart_command")?)
}

/// Local: delete compiled Python files under the working directory.
pub fn remove_bytecode() -> String {
    "find . -name '*.pyc' -type f -delete".to_string()
}
