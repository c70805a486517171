use uxmgr::core::exec::{
    EventTemplateContext, MAX_EXPANDED_COMMAND_LEN, expand_event_template,
};

fn promote_ctx() -> EventTemplateContext {
    EventTemplateContext {
        node_id: 7,
        node_name: "node7".to_string(),
        event: "standby_promote".to_string(),
        details: String::new(),
        successful: true,
        timestamp: "2024-01-02 03:04:05+00".to_string(),
        conninfo: None,
        peer_node_id: None,
    }
}

#[test]
fn test_promote_notification_expansion() {
    let template = "/bin/send --node=%n --event=%e --ok=%s --when=%t";
    let expanded = expand_event_template(template, &promote_ctx());
    assert_eq!(
        expanded,
        "/bin/send --node=7 --event=standby_promote --ok=1 --when=2024-01-02 03:04:05+00"
    );
}

#[test]
fn test_failure_renders_zero() {
    let mut ctx = promote_ctx();
    ctx.successful = false;
    assert_eq!(expand_event_template("%s", &ctx), "0");
}

#[test]
fn test_percent_escape() {
    assert_eq!(expand_event_template("100%% done", &promote_ctx()), "100% done");
}

#[test]
fn test_node_name_and_details() {
    let mut ctx = promote_ctx();
    ctx.details = "lag was 42s".to_string();
    assert_eq!(
        expand_event_template("%a: %d", &ctx),
        "node7: lag was 42s"
    );
}

#[test]
fn test_details_escapes_double_quotes() {
    let mut ctx = promote_ctx();
    ctx.details = r#"upstream "node1" lost"#.to_string();
    assert_eq!(
        expand_event_template(r#"--details="%d""#, &ctx),
        r#"--details="upstream \"node1\" lost""#
    );
}

#[test]
fn test_conninfo_and_peer_tokens() {
    let mut ctx = promote_ctx();
    ctx.conninfo = Some("host=node7 port=5432".to_string());
    ctx.peer_node_id = Some(1);
    assert_eq!(
        expand_event_template("-c '%c' -p %p", &ctx),
        "-c 'host=node7 port=5432' -p 1"
    );
}

#[test]
fn test_absent_optional_tokens_expand_empty() {
    let ctx = promote_ctx();
    assert_eq!(expand_event_template("[%c][%p]", &ctx), "[][]");
}

#[test]
fn test_unrecognised_token_passes_through() {
    assert_eq!(expand_event_template("%z %n", &promote_ctx()), "%z 7");
}

#[test]
fn test_trailing_percent_is_literal() {
    assert_eq!(expand_event_template("100%", &promote_ctx()), "100%");
}

#[test]
fn test_expansion_is_bounded() {
    let mut ctx = promote_ctx();
    ctx.details = "x".repeat(MAX_EXPANDED_COMMAND_LEN);
    let expanded = expand_event_template("%d %d %d", &ctx);
    assert!(expanded.len() <= MAX_EXPANDED_COMMAND_LEN);
}
