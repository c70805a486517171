// src/core/exec.rs

//! Shell command execution: local capture, event-notification template
//! expansion, and the password-authenticated SSH transport.

use crate::core::errors::{UxMgrError, UxMgrResult};
use std::io::{Read, Write};
use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

/// Runs a shell command locally, capturing stdout and stderr.
pub async fn local_command(cmd: &str) -> UxMgrResult<CommandOutput> {
    debug!("executing local command: {cmd}");
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .await
        .map_err(|e| UxMgrError::CommandFailed {
            exit_code: -1,
            stderr: format!("could not spawn \"{cmd}\": {e}"),
        })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
        success: output.status.success(),
    })
}

/// Blocking variant for synchronous call sites (the virtual-IP arbitrator's
/// default runner).
pub fn local_command_blocking(cmd: &str) -> UxMgrResult<CommandOutput> {
    debug!("executing local command: {cmd}");
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .map_err(|e| UxMgrError::CommandFailed {
            exit_code: -1,
            stderr: format!("could not spawn \"{cmd}\": {e}"),
        })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
        success: output.status.success(),
    })
}

/// Upper bound on an expanded notification command; longer expansions are
/// truncated at a character boundary.
pub const MAX_EXPANDED_COMMAND_LEN: usize = 8192;

/// Substitution context for event-notification templates.
#[derive(Debug, Clone, Default)]
pub struct EventTemplateContext {
    pub node_id: i32,
    pub node_name: String,
    pub event: String,
    pub details: String,
    pub successful: bool,
    pub timestamp: String,
    pub conninfo: Option<String>,
    /// Auxiliary node id, e.g. the former primary during a switchover.
    pub peer_node_id: Option<i32>,
}

/// Expands an event-notification template.
///
/// Recognised tokens: `%%` literal percent, `%n` node id, `%a` node name,
/// `%e` event name, `%d` details (double quotes escaped), `%s` success as
/// `1`/`0`, `%t` event timestamp, `%c` conninfo, `%p` auxiliary node id.
/// Unrecognised tokens are copied through unchanged.
pub fn expand_event_template(template: &str, ctx: &EventTemplateContext) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if out.len() >= MAX_EXPANDED_COMMAND_LEN {
            warn!("expanded notification command exceeds {MAX_EXPANDED_COMMAND_LEN} bytes, truncating");
            break;
        }
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('n') => out.push_str(&ctx.node_id.to_string()),
            Some('a') => out.push_str(&ctx.node_name),
            Some('e') => out.push_str(&ctx.event),
            Some('d') => out.push_str(&ctx.details.replace('"', "\\\"")),
            Some('s') => out.push(if ctx.successful { '1' } else { '0' }),
            Some('t') => out.push_str(&ctx.timestamp),
            Some('c') => out.push_str(ctx.conninfo.as_deref().unwrap_or("")),
            Some('p') => {
                if let Some(peer) = ctx.peer_node_id {
                    out.push_str(&peer.to_string());
                }
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }

    if out.len() > MAX_EXPANDED_COMMAND_LEN {
        let mut cut = MAX_EXPANDED_COMMAND_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

/// Prompts the SSH terminal state machine recognises on the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshPrompt {
    Password,
    HostKeyUnknown,
    HostKeyChanged,
}

/// Distinctive exit code reported when the remote host key has changed; the
/// caller must not retry until the operator has inspected the host.
pub const SSH_HOST_KEY_CHANGED_EXIT: i32 = 101;

/// Scans accumulated terminal output for a prompt the transport must answer.
/// Only the tail of the buffer matters for the password prompt; the host-key
/// warnings can appear anywhere in the banner.
pub fn scan_ssh_prompt(output: &str) -> Option<SshPrompt> {
    if output.contains("REMOTE HOST IDENTIFICATION HAS CHANGED") {
        return Some(SshPrompt::HostKeyChanged);
    }
    if output.contains("Are you sure you want to continue connecting") {
        return Some(SshPrompt::HostKeyUnknown);
    }
    let tail = output.trim_end_matches([' ', '\r', '\n']);
    if tail.to_ascii_lowercase().ends_with("password:") {
        return Some(SshPrompt::Password);
    }
    None
}

/// Runs `ssh` against `target` with password authentication, driving the
/// prompt dialogue over a pseudo-terminal. Blocking; callers inside the
/// runtime wrap it in `spawn_blocking`.
pub fn ssh_command_with_password(
    target: &str,
    remote_cmd: &str,
    ssh_options: &str,
    password: &str,
    timeout: Duration,
) -> UxMgrResult<CommandOutput> {
    let pty = nix::pty::openpty(None, None).map_err(|e| UxMgrError::CommandFailed {
        exit_code: -1,
        stderr: format!("could not allocate pseudo-terminal: {e}"),
    })?;

    let slave_for_child = |fd: &OwnedFd| -> UxMgrResult<Stdio> {
        let dup = fd.try_clone().map_err(|e| UxMgrError::Io {
            path: std::path::PathBuf::from("/dev/ptmx"),
            source: e,
        })?;
        Ok(Stdio::from(dup))
    };

    let mut cmd = std::process::Command::new("sh");
    cmd.arg("-c")
        .arg(format!("exec ssh {ssh_options} {target} {remote_cmd}"))
        .stdin(slave_for_child(&pty.slave)?)
        .stdout(slave_for_child(&pty.slave)?)
        .stderr(slave_for_child(&pty.slave)?);

    // The child must make the slave its controlling terminal, otherwise ssh
    // reads the password from the invoking terminal instead.
    unsafe {
        use std::os::unix::process::CommandExt;
        cmd.pre_exec(|| {
            unsafe {
                libc::setsid();
                libc::ioctl(0, libc::TIOCSCTTY, 0);
            }
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(|e| UxMgrError::CommandFailed {
        exit_code: -1,
        stderr: format!("could not spawn ssh: {e}"),
    })?;
    drop(pty.slave);

    let mut master = std::fs::File::from(pty.master);
    let mut collected = String::new();
    let mut answered_password = false;
    let deadline = Instant::now() + timeout;
    let mut chunk = [0u8; 4096];

    loop {
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(UxMgrError::Timeout(format!(
                "ssh to {target} did not complete within {timeout:?}"
            )));
        }

        match master.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                collected.push_str(&String::from_utf8_lossy(&chunk[..n]));
                match scan_ssh_prompt(&collected) {
                    Some(SshPrompt::Password) if !answered_password => {
                        master
                            .write_all(format!("{password}\n").as_bytes())
                            .map_err(|e| UxMgrError::Io {
                                path: std::path::PathBuf::from("/dev/ptmx"),
                                source: e,
                            })?;
                        answered_password = true;
                        collected.clear();
                    }
                    Some(SshPrompt::HostKeyUnknown) => {
                        let _ = master.write_all(b"yes\n");
                        collected.clear();
                    }
                    Some(SshPrompt::HostKeyChanged) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok(CommandOutput {
                            stdout: String::new(),
                            stderr: collected,
                            exit_code: SSH_HOST_KEY_CHANGED_EXIT,
                            success: false,
                        });
                    }
                    _ => {}
                }
            }
            // EIO is the normal end-of-stream signal once the slave side
            // closes.
            Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(UxMgrError::Io {
                    path: std::path::PathBuf::from("/dev/ptmx"),
                    source: e,
                });
            }
        }
    }

    let status = child.wait().map_err(|e| UxMgrError::Io {
        path: std::path::PathBuf::from("ssh"),
        source: e,
    })?;
    let exit_code = status.code().unwrap_or(-1);
    Ok(CommandOutput {
        stdout: collected,
        stderr: String::new(),
        exit_code,
        success: status.success(),
    })
}
