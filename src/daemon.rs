//! Daemon process plumbing: backgrounding, pid file, log redirection.

use anyhow::{bail, Context, Result};
use nix::unistd::{fork, setsid, ForkResult};
use std::fs::{self, File};
use std::os::unix::io::AsRawFd;

use crate::config::Config;

/// Detach from the terminal and continue as a background daemon.
///
/// Classic double fork: the first fork's parent exits, `setsid` detaches
/// from the controlling terminal, and the second fork prevents acquiring
/// a new one. The surviving grandchild writes the pid file and redirects
/// stdout/stderr into the daemon log.
pub fn daemonize(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.state_dir).with_context(|| {
        format!(
            "Failed to create state directory: {}",
            config.state_dir.display()
        )
    })?;

    match unsafe { fork() }.context("First fork failed")? {
        ForkResult::Parent { .. } => {
            // Parent exits; the daemon lives on
            std::process::exit(0);
        }
        ForkResult::Child => {}
    }

    setsid().context("setsid failed")?;

    match unsafe { fork() }.context("Second fork failed")? {
        ForkResult::Parent { .. } => {
            std::process::exit(0);
        }
        ForkResult::Child => {}
    }

    fs::write(config.pid_path(), format!("{}", std::process::id()))
        .context("Failed to write pid file")?;

    let log_file = File::create(config.log_path()).context("Failed to create log file")?;
    let log_fd = log_file.as_raw_fd();

    unsafe {
        libc::close(0);
        if libc::dup2(log_fd, 1) < 0 {
            bail!("Failed to redirect stdout");
        }
        if libc::dup2(log_fd, 2) < 0 {
            bail!("Failed to redirect stderr");
        }
    }

    Ok(())
}

/// Remove the pid file on graceful shutdown. Missing file is fine.
pub fn cleanup(config: &Config) -> Result<()> {
    if let Err(e) = fs::remove_file(config.pid_path()) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(e).context("Failed to remove pid file");
        }
    }
    Ok(())
}
