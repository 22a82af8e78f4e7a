//! Pipe transport: owns the browser process and the framed byte stream.
//!
//! The browser's `--remote-debugging-pipe` mode speaks NUL-terminated JSON
//! over two fixed descriptors in the child: it reads commands on FD 3 and
//! writes frames on FD 4. We create both pipe pairs, dup them into place
//! between fork and exec, and keep the parent ends.
//!
//! A broken pipe is terminal. There is no reconnect; the dispatch loop
//! observes EOF exactly once and fails everything outstanding.

use std::os::fd::AsRawFd;
use std::os::unix::io::RawFd;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::config::Config;
use crate::error::Result;

/// Descriptor the child reads commands from.
const CHILD_READ_FD: RawFd = 3;
/// Descriptor the child writes frames to.
const CHILD_WRITE_FD: RawFd = 4;

/// Spawn the browser with the debugging pipe wired up. Returns the child
/// plus the parent-side read and write ends.
pub async fn launch(config: &mut Config) -> Result<(Child, pipe::Receiver, pipe::Sender)> {
    let argv = config.build_argv()?;
    let env = config.build_env();

    // Parent writes p2c, child reads it on FD 3; child writes c2p on
    // FD 4, parent reads it.
    let (child_read, parent_write) = nix::unistd::pipe().map_err(std::io::Error::from)?;
    let (parent_read, child_write) = nix::unistd::pipe().map_err(std::io::Error::from)?;

    let child_read_fd = child_read.as_raw_fd();
    let child_write_fd = child_write.as_raw_fd();
    let parent_fds = [parent_write.as_raw_fd(), parent_read.as_raw_fd()];

    let mut cmd = Command::new(&config.chrome_path);
    cmd.args(&argv)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        // Discarded to avoid pipe-backpressure deadlocks on a chatty child.
        .stderr(Stdio::null())
        .kill_on_drop(true);

    unsafe {
        cmd.pre_exec(move || {
            nix::unistd::dup2(child_read_fd, CHILD_READ_FD).map_err(std::io::Error::from)?;
            nix::unistd::dup2(child_write_fd, CHILD_WRITE_FD).map_err(std::io::Error::from)?;
            for fd in [child_read_fd, child_write_fd, parent_fds[0], parent_fds[1]] {
                if fd != CHILD_READ_FD && fd != CHILD_WRITE_FD {
                    let _ = nix::unistd::close(fd);
                }
            }
            Ok(())
        });
    }

    tracing::info!(path = %config.chrome_path, args = argv.len(), "launching browser");
    let child = cmd.spawn()?;
    // Child ends live on in the child only.
    drop(child_read);
    drop(child_write);

    let writer = pipe::Sender::from_owned_fd(parent_write)?;
    let reader = pipe::Receiver::from_owned_fd(parent_read)?;

    tracing::info!(pid = child.id(), "browser launched");
    Ok((child, reader, writer))
}

/// Read one NUL-terminated frame. `Ok(None)` means clean or mid-frame EOF;
/// either way the connection is finished.
pub(crate) async fn read_frame<'a, R>(
    reader: &mut R,
    buf: &'a mut Vec<u8>,
) -> std::io::Result<Option<&'a [u8]>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = reader.read_until(0, buf).await?;
    if n == 0 || buf.last() != Some(&0) {
        return Ok(None);
    }
    Ok(Some(&buf[..n - 1]))
}

/// Write one frame: payload bytes plus the NUL terminator. The payload
/// must not contain an embedded NUL; serialized JSON never does.
pub(crate) async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.contains(&0) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame payload contains embedded NUL",
        ));
    }
    writer.write_all(payload).await?;
    writer.write_all(&[0]).await?;
    writer.flush().await
}

/// Escalating process shutdown. The graceful protocol close has already
/// been requested by the caller; from here: bounded wait, SIGTERM,
/// bounded wait, SIGKILL. Every step has its own timeout so a
/// misbehaving child cannot hang us.
pub(crate) async fn shutdown_process(
    child: &mut Child,
    grace: Duration,
    term_grace: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    if let Ok(status) = timeout(grace, child.wait()).await {
        return status;
    }

    if let Some(pid) = child.id() {
        tracing::debug!(pid, "terminating browser process");
        if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            // Already gone between the wait and the signal.
            tracing::debug!(%err, "SIGTERM failed");
        }
    }
    if let Ok(status) = timeout(term_grace, child.wait()).await {
        return status;
    }

    tracing::warn!("timed out waiting for process exit, killing");
    child.start_kill()?;
    child.wait().await
}
