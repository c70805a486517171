// src/core/vip.rs

//! Virtual-IP arbitration.
//!
//! Binds or unbinds virtual addresses on a physical interface and announces
//! takeovers with gratuitous ARP. Both directions check the running kernel
//! first, so a repeated bind or unbind is a no-op success.
//!
//! The arbitrator cannot distinguish "should own this address" from
//! "someone else already owns it": it is only safe to invoke after the
//! caller has won the election and published the new catalog state. During
//! a split-brain two arbitrators may both believe they own the address;
//! `cluster crosscheck` surfaces that condition for the operator.

use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::exec::{CommandOutput, local_command_blocking};
use tracing::{debug, info, warn};

/// Seam for command execution, so address arbitration can be exercised
/// without touching the kernel.
pub trait CommandRunner {
    fn run(&self, cmd: &str) -> UxMgrResult<CommandOutput>;
}

/// Runs commands through the system shell.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &str) -> UxMgrResult<CommandOutput> {
        local_command_blocking(cmd)
    }
}

/// One virtual address paired with the interface that carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAddress {
    /// Address in CIDR form, e.g. `192.0.2.10/24`.
    pub address: String,
    pub interface: String,
}

/// Configuration for privilege escalation and ARP announcement.
#[derive(Debug, Clone, Default)]
pub struct VipCommandConfig {
    /// Command template for the gratuitous ARP announcement; `%a` is the
    /// bare address, `%i` the interface.
    pub arping_command: Option<String>,
    /// Privilege-escalation helper prefixed when not running as root.
    pub sudo_command: String,
    /// Password piped into the helper when configured.
    pub sudo_password: Option<String>,
}

pub struct VipArbitrator<R: CommandRunner> {
    addresses: Vec<VirtualAddress>,
    commands: VipCommandConfig,
    runner: R,
    is_root: bool,
}

impl VipArbitrator<SystemRunner> {
    pub fn new(addresses: Vec<VirtualAddress>, commands: VipCommandConfig) -> Self {
        // Non-root invocations go through the escalation helper.
        let is_root = unsafe { libc::geteuid() == 0 };
        Self::with_runner(addresses, commands, SystemRunner, is_root)
    }
}

impl<R: CommandRunner> VipArbitrator<R> {
    pub fn with_runner(
        addresses: Vec<VirtualAddress>,
        commands: VipCommandConfig,
        runner: R,
        is_root: bool,
    ) -> Self {
        Self {
            addresses,
            commands,
            runner,
            is_root,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Binds every configured address, announcing each newly bound one.
    pub fn bind_all(&self) -> UxMgrResult<()> {
        for vaddr in &self.addresses {
            self.bind(vaddr)?;
        }
        Ok(())
    }

    /// Removes every configured address.
    pub fn unbind_all(&self) -> UxMgrResult<()> {
        for vaddr in &self.addresses {
            self.unbind(vaddr)?;
        }
        Ok(())
    }

    fn bind(&self, vaddr: &VirtualAddress) -> UxMgrResult<()> {
        if self.is_present(vaddr)? {
            debug!(
                "virtual address {} already present on {}",
                vaddr.address, vaddr.interface
            );
            return Ok(());
        }

        let cmd = self.privileged(&format!(
            "ip addr add {} dev {}",
            vaddr.address, vaddr.interface
        ));
        let out = self.runner.run(&cmd)?;
        if !out.success {
            return Err(UxMgrError::CommandFailed {
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }
        info!(
            "bound virtual address {} on {}",
            vaddr.address, vaddr.interface
        );
        self.announce(vaddr);
        Ok(())
    }

    fn unbind(&self, vaddr: &VirtualAddress) -> UxMgrResult<()> {
        if !self.is_present(vaddr)? {
            debug!(
                "virtual address {} already absent from {}",
                vaddr.address, vaddr.interface
            );
            return Ok(());
        }

        let cmd = self.privileged(&format!(
            "ip addr del {} dev {}",
            vaddr.address, vaddr.interface
        ));
        let out = self.runner.run(&cmd)?;
        if !out.success {
            return Err(UxMgrError::CommandFailed {
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }
        info!(
            "removed virtual address {} from {}",
            vaddr.address, vaddr.interface
        );
        Ok(())
    }

    /// Asks the kernel whether the address is already configured.
    fn is_present(&self, vaddr: &VirtualAddress) -> UxMgrResult<bool> {
        let cmd = format!("ip -o addr show dev {}", vaddr.interface);
        let out = self.runner.run(&cmd)?;
        if !out.success {
            return Err(UxMgrError::CommandFailed {
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }
        let bare = bare_address(&vaddr.address);
        Ok(out
            .stdout
            .lines()
            .any(|line| line.split_whitespace().any(|tok| bare_address(tok) == bare)))
    }

    /// Broadcasts a gratuitous ARP announcement; failures only warn, the
    /// address is already bound.
    fn announce(&self, vaddr: &VirtualAddress) {
        let Some(template) = &self.commands.arping_command else {
            return;
        };
        let cmd = self.privileged(
            &template
                .replace("%a", bare_address(&vaddr.address))
                .replace("%i", &vaddr.interface),
        );
        match self.runner.run(&cmd) {
            Ok(out) if out.success => {}
            Ok(out) => warn!(
                "gratuitous ARP announcement for {} failed (exit {})",
                vaddr.address, out.exit_code
            ),
            Err(e) => warn!(
                "gratuitous ARP announcement for {} failed: {}",
                vaddr.address, e
            ),
        }
    }

    fn privileged(&self, cmd: &str) -> String {
        if self.is_root {
            return cmd.to_string();
        }
        match &self.commands.sudo_password {
            Some(password) => format!(
                "printf '%s\\n' '{}' | {} -S {}",
                password.replace('\'', "'\\''"),
                self.commands.sudo_command,
                cmd
            ),
            None => format!("{} {}", self.commands.sudo_command, cmd),
        }
    }
}

/// Strips the prefix length from a CIDR address.
fn bare_address(addr: &str) -> &str {
    addr.split('/').next().unwrap_or(addr)
}
