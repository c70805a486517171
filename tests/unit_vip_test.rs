use parking_lot::Mutex;
use std::collections::BTreeSet;
use uxmgr::core::errors::UxMgrResult;
use uxmgr::core::exec::CommandOutput;
use uxmgr::core::vip::{
    CommandRunner, VipArbitrator, VipCommandConfig, VirtualAddress,
};

/// A fake kernel: tracks bound addresses and records every mutating
/// command.
#[derive(Default)]
struct FakeKernel {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    present: BTreeSet<String>,
    adds: Vec<String>,
    dels: Vec<String>,
    arpings: Vec<String>,
}

fn ok(stdout: String) -> CommandOutput {
    CommandOutput {
        stdout,
        stderr: String::new(),
        exit_code: 0,
        success: true,
    }
}

impl CommandRunner for FakeKernel {
    fn run(&self, cmd: &str) -> UxMgrResult<CommandOutput> {
        let mut state = self.state.lock();
        if cmd.starts_with("ip -o addr show") {
            let listing = state
                .present
                .iter()
                .map(|addr| format!("2: eth0    inet {addr} brd 192.0.2.255 scope global eth0"))
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(ok(listing));
        }
        if let Some(rest) = cmd.split("ip addr add ").nth(1) {
            let addr = rest.split_whitespace().next().unwrap().to_string();
            state.adds.push(addr.clone());
            state.present.insert(addr);
            return Ok(ok(String::new()));
        }
        if let Some(rest) = cmd.split("ip addr del ").nth(1) {
            let addr = rest.split_whitespace().next().unwrap().to_string();
            state.dels.push(addr.clone());
            state.present.remove(&addr);
            return Ok(ok(String::new()));
        }
        if cmd.contains("arping") {
            state.arpings.push(cmd.to_string());
            return Ok(ok(String::new()));
        }
        panic!("unexpected command: {cmd}");
    }
}

fn arbitrator(runner_is_root: bool) -> VipArbitrator<FakeKernel> {
    VipArbitrator::with_runner(
        vec![VirtualAddress {
            address: "192.0.2.10/24".to_string(),
            interface: "eth0".to_string(),
        }],
        VipCommandConfig {
            arping_command: Some("arping -U -I %i %a".to_string()),
            sudo_command: "sudo -n".to_string(),
            sudo_password: None,
        },
        FakeKernel::default(),
        runner_is_root,
    )
}

// Test access to the fake behind the arbitrator.
impl std::ops::Deref for FakeKernel {
    type Target = Mutex<FakeState>;
    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

#[test]
fn test_bind_is_idempotent() {
    let vip = arbitrator(true);
    vip.bind_all().unwrap();
    vip.bind_all().unwrap();

    // The second bind observed the address as present and changed nothing.
    let kernel = vip.runner();
    let state = kernel.lock();
    assert_eq!(state.adds, vec!["192.0.2.10/24"]);
    assert!(state.present.contains("192.0.2.10/24"));
    assert_eq!(state.arpings.len(), 1);
}

#[test]
fn test_unbind_is_idempotent() {
    let vip = arbitrator(true);
    vip.bind_all().unwrap();
    vip.unbind_all().unwrap();
    vip.unbind_all().unwrap();

    let kernel = vip.runner();
    let state = kernel.lock();
    assert_eq!(state.dels, vec!["192.0.2.10/24"]);
    assert!(state.present.is_empty());
}

#[test]
fn test_unbind_absent_address_is_noop() {
    let vip = arbitrator(true);
    vip.unbind_all().unwrap();

    let kernel = vip.runner();
    let state = kernel.lock();
    assert!(state.dels.is_empty());
}

#[test]
fn test_announce_uses_bare_address_and_interface() {
    let vip = arbitrator(true);
    vip.bind_all().unwrap();

    let kernel = vip.runner();
    let state = kernel.lock();
    assert_eq!(state.arpings, vec!["arping -U -I eth0 192.0.2.10"]);
}

#[test]
fn test_non_root_prefixes_escalation_helper() {
    let vip = arbitrator(false);
    vip.bind_all().unwrap();

    // The fake recorded the add, which means the command carried the
    // escalation prefix and still parsed.
    let kernel = vip.runner();
    let state = kernel.lock();
    assert_eq!(state.adds, vec!["192.0.2.10/24"]);
}
