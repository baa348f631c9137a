//! OS mount and package-registration primitives
//!
//! The orchestrator only depends on the [`Mounter`] and [`Registrar`]
//! contracts; the real implementations wrap the bind-mount syscalls and
//! an external registration helper. Tests substitute in-memory fakes.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Registration succeeded; the title is newly known to the package manager.
pub const REGISTER_OK: i32 = 0;

/// The package manager already knows this title; treat as a remount.
pub const ALREADY_REGISTERED: i32 = 0x8099_0002_u32 as i32;

pub trait Mounter {
    /// Bind the source package directory read-only onto the target.
    fn mount_ro(&self, source: &Path, target: &Path) -> Result<()>;

    /// Unmount the target. Idempotent: a target that is not mounted is Ok.
    fn unmount(&self, target: &Path) -> Result<()>;
}

pub trait Registrar {
    /// Register the title rooted under `install_root` with the package
    /// manager, returning its raw result code.
    fn register(&self, title_id: &str, install_root: &Path) -> Result<i32>;
}

/// Read-only bind mounts via the mount syscall.
pub struct BindMounter;

#[cfg(target_os = "linux")]
impl Mounter for BindMounter {
    fn mount_ro(&self, source: &Path, target: &Path) -> Result<()> {
        use nix::mount::{mount, MsFlags};

        mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_RDONLY,
            None::<&str>,
        )
        .with_context(|| {
            format!(
                "Failed to bind {} onto {}",
                source.display(),
                target.display()
            )
        })
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        use nix::errno::Errno;
        use nix::mount::{umount2, MntFlags};

        match umount2(target, MntFlags::empty()) {
            Ok(()) => Ok(()),
            // EINVAL: not a mount point. ENOENT: target gone. Both mean
            // there is nothing mounted, which satisfies the contract.
            Err(Errno::EINVAL) | Err(Errno::ENOENT) => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to unmount {}", target.display()))
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl Mounter for BindMounter {
    fn mount_ro(&self, _source: &Path, _target: &Path) -> Result<()> {
        anyhow::bail!("bind mounts are only supported on Linux")
    }

    fn unmount(&self, _target: &Path) -> Result<()> {
        Ok(())
    }
}

/// Registers titles by invoking an external helper command with the title
/// id and install root.
///
/// The helper prints its raw 32-bit result code on stdout, hex or
/// decimal. Exit statuses are 8-bit and cannot carry codes like
/// [`ALREADY_REGISTERED`], so the exit status is only a fallback for
/// helpers that print nothing.
pub struct CommandRegistrar {
    command: PathBuf,
}

impl CommandRegistrar {
    pub fn new(command: PathBuf) -> Self {
        Self { command }
    }
}

impl Registrar for CommandRegistrar {
    fn register(&self, title_id: &str, install_root: &Path) -> Result<i32> {
        let output = Command::new(&self.command)
            .arg(title_id)
            .arg(install_root)
            .output()
            .with_context(|| {
                format!("Failed to run register command: {}", self.command.display())
            })?;

        let code = parse_result_code(&output.stdout)
            .unwrap_or_else(|| output.status.code().unwrap_or(-1));
        debug!(title_id, code, "Register command finished");
        Ok(code)
    }
}

/// Parse the first stdout token as a result code: `0x`-prefixed hex or
/// plain decimal. `None` when the helper printed nothing usable.
fn parse_result_code(stdout: &[u8]) -> Option<i32> {
    let token = std::str::from_utf8(stdout).ok()?.split_whitespace().next()?;

    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(|code| code as i32),
        None => token.parse::<i64>().ok().map(|code| code as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn helper_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("appinst");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_register_stdout_carries_full_code() {
        let temp = tempfile::TempDir::new().unwrap();
        // Exit statuses are truncated to 8 bits; only stdout can carry
        // the already-registered sentinel intact.
        let helper = helper_script(temp.path(), "echo 0x80990002\nexit 2");

        let registrar = CommandRegistrar::new(helper);
        let code = registrar
            .register("CUSA00001", Path::new("/tmp"))
            .unwrap();
        assert_eq!(code, ALREADY_REGISTERED);
    }

    #[cfg(unix)]
    #[test]
    fn test_register_stdout_decimal_code() {
        let temp = tempfile::TempDir::new().unwrap();
        let helper = helper_script(temp.path(), "echo 0");

        let registrar = CommandRegistrar::new(helper);
        let code = registrar
            .register("CUSA00001", Path::new("/tmp"))
            .unwrap();
        assert_eq!(code, REGISTER_OK);
    }

    #[test]
    fn test_register_exit_status_fallback_when_silent() {
        let registrar = CommandRegistrar::new(PathBuf::from("true"));
        let code = registrar
            .register("CUSA00001", Path::new("/tmp"))
            .unwrap();
        assert_eq!(code, REGISTER_OK);

        let registrar = CommandRegistrar::new(PathBuf::from("false"));
        let code = registrar
            .register("CUSA00001", Path::new("/tmp"))
            .unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn test_parse_result_code_forms() {
        assert_eq!(parse_result_code(b"0x80990002\n"), Some(ALREADY_REGISTERED));
        assert_eq!(parse_result_code(b"2157379586\n"), Some(ALREADY_REGISTERED));
        assert_eq!(parse_result_code(b"0\n"), Some(REGISTER_OK));
        assert_eq!(parse_result_code(b""), None);
        assert_eq!(parse_result_code(b"registered ok\n"), None);
    }

    #[test]
    fn test_register_command_missing_binary_errors() {
        let registrar = CommandRegistrar::new(PathBuf::from("/no/such/helper"));
        assert!(registrar.register("CUSA00001", Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_unmount_non_mount_point_is_ok() {
        let temp = tempfile::TempDir::new().unwrap();
        BindMounter.unmount(temp.path()).unwrap();
        BindMounter.unmount(&temp.path().join("missing")).unwrap();
    }
}
