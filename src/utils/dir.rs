use std::{env, io, path::PathBuf};

use anyhow::{anyhow, Result};

const APPLICATION_DIR: &str = "hourly";

/// `%APPDATA%\hourly` on Windows, `$XDG_STATE_HOME/hourly` or `$HOME/.local/state/hourly`
/// elsewhere. The directory is created if missing.
pub fn create_application_default_path() -> Result<PathBuf> {
    let mut path = base_dir()?;
    path.push(APPLICATION_DIR);

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

#[cfg(windows)]
fn base_dir() -> Result<PathBuf> {
    env::var("APPDATA")
        .map(PathBuf::from)
        .map_err(|_| anyhow!("APPDATA should be present on Windows"))
}

#[cfg(not(windows))]
fn base_dir() -> Result<PathBuf> {
    env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|_| {
            env::var("HOME").map(|home| {
                let mut path = PathBuf::from(home);
                path.push(".local/state");
                path
            })
        })
        .map_err(|_| anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))
}
