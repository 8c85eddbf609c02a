use crate::defaults;
use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Base limeship config directory (universal ~/.config/limeship/ on all platforms)
pub fn limeship() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("limeship"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("limeship"))
    }
}

/// Fallback project file shared by every working directory.
pub fn global_project_file() -> Result<PathBuf> {
    Ok(limeship()?.join(defaults::PROJECT_FILE))
}

/// Project file in the given directory.
pub fn project_file_in(dir: &Path) -> PathBuf {
    dir.join(defaults::PROJECT_FILE)
}

/// Expand `~` and environment variables in an operator-supplied path.
pub fn expand(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}
