use uxmgr::core::conninfo::ConnInfo;

#[test]
fn test_parse_basic_pairs() {
    let info = ConnInfo::parse("host=node1 port=5432 dbname=uxdb user=uxmgr").unwrap();
    assert_eq!(info.get("host"), Some("node1"));
    assert_eq!(info.get("port"), Some("5432"));
    assert_eq!(info.get("dbname"), Some("uxdb"));
    assert_eq!(info.get("user"), Some("uxmgr"));
}

#[test]
fn test_parse_preserves_insertion_order() {
    let info = ConnInfo::parse("port=5432 host=node1 user=uxmgr").unwrap();
    let keys: Vec<&str> = info.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["port", "host", "user"]);
    assert_eq!(info.to_string(), "port=5432 host=node1 user=uxmgr");
}

#[test]
fn test_parse_quoted_value() {
    let info = ConnInfo::parse("host=node1 password='se cret'").unwrap();
    assert_eq!(info.get("password"), Some("se cret"));
}

#[test]
fn test_parse_escaped_quote_in_value() {
    let info = ConnInfo::parse(r"password='it\'s'").unwrap();
    assert_eq!(info.get("password"), Some("it's"));
}

#[test]
fn test_parse_whitespace_around_equals() {
    let info = ConnInfo::parse("host = node1 port =5432").unwrap();
    assert_eq!(info.get("host"), Some("node1"));
    assert_eq!(info.get("port"), Some("5432"));
}

#[test]
fn test_parse_missing_equals_is_error() {
    assert!(ConnInfo::parse("host node1").is_err());
}

#[test]
fn test_parse_unterminated_quote_is_error() {
    assert!(ConnInfo::parse("password='oops").is_err());
}

#[test]
fn test_render_quotes_values_with_spaces() {
    let mut info = ConnInfo::new();
    info.set("host", "node1");
    info.set("password", "se cret");
    assert_eq!(info.to_string(), "host=node1 password='se cret'");
}

#[test]
fn test_render_empty_value_is_quoted() {
    let mut info = ConnInfo::new();
    info.set("password", "");
    assert_eq!(info.to_string(), "password=''");
}

#[test]
fn test_round_trip_preserves_fields() {
    let original = "host=node1 port=6432 user=uxrepl password='p w' dbname=uxdb";
    let info = ConnInfo::parse(original).unwrap();
    let rendered = info.to_string();
    let reparsed = ConnInfo::parse(&rendered).unwrap();
    assert_eq!(info, reparsed);
}

#[test]
fn test_set_replaces_in_place() {
    let mut info = ConnInfo::parse("host=node1 user=alice dbname=uxdb").unwrap();
    info.set("user", "bob");
    let keys: Vec<&str> = info.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["host", "user", "dbname"]);
    assert_eq!(info.get("user"), Some("bob"));
}

#[test]
fn test_set_default_does_not_overwrite() {
    let mut info = ConnInfo::parse("application_name=myapp").unwrap();
    info.set_default("application_name", "uxmgr");
    assert_eq!(info.get("application_name"), Some("myapp"));
}

#[test]
fn test_for_replication_derivation() {
    let info = ConnInfo::parse("host=node1 port=5432 dbname=uxdb user=alice").unwrap();
    let repl = info.for_replication("uxrepl");
    assert_eq!(repl.get("user"), Some("uxrepl"));
    assert_eq!(repl.get("replication"), Some("1"));
    assert_eq!(repl.get("dbname"), Some("replication"));
    // Untouched keys keep their positions.
    assert_eq!(repl.get("host"), Some("node1"));
    assert_eq!(repl.get("port"), Some("5432"));
}

#[test]
fn test_with_user_substitution() {
    let info = ConnInfo::parse("host=node1 user=alice").unwrap();
    let dup = info.with_user(Some("carol"));
    assert_eq!(dup.get("user"), Some("carol"));
    assert_eq!(info.get("user"), Some("alice"));
    let same = info.with_user(None);
    assert_eq!(same.get("user"), Some("alice"));
}

#[test]
fn test_remove() {
    let mut info = ConnInfo::parse("host=node1 password=x user=alice").unwrap();
    assert_eq!(info.remove("password"), Some("x".to_string()));
    assert_eq!(info.get("password"), None);
    assert_eq!(info.to_string(), "host=node1 user=alice");
}
