//! AppImage environment scrubbing.
//!
//! When the runtime ships as an AppImage, the AppRun launcher rewrites
//! the process environment so the bundle's own libraries win. Child
//! processes spawned by the process sub-manager must behave as though
//! they were launched outside the bundle, so [`init`] reverts those
//! changes once, early in startup:
//!
//! 1. restore the working directory from `APPRUN_CWD`
//! 2. revert every variable preserved in `APPRUN_ORIGINAL_<name>`
//! 3. unset `ARGV0`, `ORIGIN`, and all `APPRUN*`/`APPDIR*`/`APPIMAGE*`/
//!    `AIX_*` variables
//! 4. filter `/tmp/.mount_*` entries out of every colon-separated
//!    path-like variable
//!
//! Nothing happens when `APPIMAGE` is not set. [`init`] is an explicit
//! call from startup code, guarded so it runs at most once per process;
//! there is no hidden global constructor.

use std::env;
use std::io;
use std::sync::OnceLock;
use tracing::error;

const MOUNT_PREFIX: &str = "/tmp/.mount_";

/// Runs the scrub once per process, logging (not propagating) failure.
pub fn init() {
    static SCRUBBED: OnceLock<()> = OnceLock::new();
    SCRUBBED.get_or_init(|| {
        if let Err(err) = clean_app_image_env() {
            error!(error = %err, "error cleaning up AppImage environment");
        }
    });
}

/// Reverts AppImage launcher changes to the environment.
///
/// # Errors
///
/// Returns the underlying I/O error when restoring the working
/// directory fails.
pub fn clean_app_image_env() -> io::Result<()> {
    if env::var_os("APPIMAGE").is_none() {
        return Ok(());
    }

    if let Some(cwd) = env::var_os("APPRUN_CWD") {
        env::set_current_dir(cwd)?;
    }

    // Reset original values where the launcher preserved them.
    for (key, _) in env::vars() {
        if let Ok(original) = env::var(format!("APPRUN_ORIGINAL_{key}")) {
            if original.is_empty() {
                env::remove_var(&key);
            } else {
                env::set_var(&key, original);
            }
        }
    }

    // Remove all explicit AppImage variables.
    env::remove_var("ARGV0");
    env::remove_var("ORIGIN");
    for (key, _) in env::vars() {
        if is_app_image_var(&key) {
            env::remove_var(&key);
        }
    }

    // Remove AppImage mount paths from path-like variables.
    for (key, value) in env::vars() {
        if value.contains(MOUNT_PREFIX) {
            match strip_mount_paths(&value) {
                Some(filtered) => env::set_var(&key, filtered),
                None => env::remove_var(&key),
            }
        }
    }

    Ok(())
}

/// Returns `true` for variables the AppImage launcher owns.
fn is_app_image_var(key: &str) -> bool {
    key.starts_with("APPRUN")
        || key.starts_with("APPDIR")
        || key.starts_with("APPIMAGE")
        || key.starts_with("AIX_")
}

/// Filters bundle mount entries out of a colon-separated value.
///
/// Returns `None` when nothing remains, meaning the variable should be
/// unset.
fn strip_mount_paths(value: &str) -> Option<String> {
    let kept: Vec<&str> = value
        .split(':')
        .filter(|path| !path.is_empty() && !path.starts_with(MOUNT_PREFIX))
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(":"))
    }
}
