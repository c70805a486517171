use uxmgr::core::exec::{SSH_HOST_KEY_CHANGED_EXIT, SshPrompt, scan_ssh_prompt};

#[test]
fn test_recognises_password_prompt() {
    assert_eq!(
        scan_ssh_prompt("uxadmin@node1's password: "),
        Some(SshPrompt::Password)
    );
    assert_eq!(scan_ssh_prompt("Password:"), Some(SshPrompt::Password));
}

#[test]
fn test_password_prompt_must_be_at_tail() {
    // A prompt scrolled off by later output was already answered.
    assert_eq!(scan_ssh_prompt("password: \nLast login: Tue"), None);
}

#[test]
fn test_recognises_unknown_host_key_prompt() {
    let banner = "The authenticity of host 'node1 (192.0.2.1)' can't be established.\n\
                  ED25519 key fingerprint is SHA256:abcdef.\n\
                  Are you sure you want to continue connecting (yes/no/[fingerprint])? ";
    assert_eq!(scan_ssh_prompt(banner), Some(SshPrompt::HostKeyUnknown));
}

#[test]
fn test_recognises_changed_host_key() {
    let banner = "@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@\n\
                  @    WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED!     @\n\
                  @@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@\n";
    assert_eq!(scan_ssh_prompt(banner), Some(SshPrompt::HostKeyChanged));
}

#[test]
fn test_changed_key_outranks_password_prompt() {
    let banner = "WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED!\npassword: ";
    assert_eq!(scan_ssh_prompt(banner), Some(SshPrompt::HostKeyChanged));
}

#[test]
fn test_ordinary_output_is_no_prompt() {
    assert_eq!(scan_ssh_prompt("Linux node1 6.1.0 x86_64\n$ "), None);
    assert_eq!(scan_ssh_prompt(""), None);
}

#[test]
fn test_distinctive_exit_code_is_stable() {
    // Scripted callers match on this value; it must not drift.
    assert_eq!(SSH_HOST_KEY_CHANGED_EXIT, 101);
}
