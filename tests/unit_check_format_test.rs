use uxmgr::actions::check::{
    CheckResult, CheckStatus, OutputFormat, archive_ready_result, render, replication_lag_result,
    threshold_status,
};

#[test]
fn test_threshold_boundaries() {
    assert_eq!(threshold_status(9, 10, 50), CheckStatus::Ok);
    assert_eq!(threshold_status(10, 10, 50), CheckStatus::Warning);
    assert_eq!(threshold_status(49, 10, 50), CheckStatus::Warning);
    assert_eq!(threshold_status(50, 10, 50), CheckStatus::Critical);
    assert_eq!(threshold_status(60, 10, 50), CheckStatus::Critical);
}

#[test]
fn test_archive_ready_breach_produces_nagios_perf_data() {
    // 60 pending files against warning=10, critical=50.
    let result = archive_ready_result(Some(60), 10, 50);
    assert_eq!(result.status, CheckStatus::Critical);

    let (line, aggregate) = render(&[result], OutputFormat::Nagios);
    assert_eq!(aggregate, CheckStatus::Critical);
    assert!(line.starts_with("UXMGR CRITICAL - "), "line: {line}");
    assert!(line.contains("files=60;10;50"), "line: {line}");
}

#[test]
fn test_archive_ready_unreadable_directory_is_unknown() {
    let result = archive_ready_result(None, 10, 50);
    assert_eq!(result.status, CheckStatus::Unknown);
    assert!(result.perf.is_none());
}

#[test]
fn test_replication_lag_thresholds() {
    assert_eq!(replication_lag_result(10, 300, 600).status, CheckStatus::Ok);
    assert_eq!(replication_lag_result(300, 300, 600).status, CheckStatus::Warning);
    assert_eq!(replication_lag_result(601, 300, 600).status, CheckStatus::Critical);
}

#[test]
fn test_aggregate_is_worst_status() {
    let results = vec![
        archive_ready_result(Some(0), 10, 50),
        replication_lag_result(400, 300, 600),
        archive_ready_result(Some(1), 10, 50),
    ];
    let (_, aggregate) = render(&results, OutputFormat::Text);
    assert_eq!(aggregate, CheckStatus::Warning);
}

#[test]
fn test_csv_format_quotes_fields() {
    let result = archive_ready_result(Some(3), 10, 50);
    let (line, _) = render(&[result], OutputFormat::Csv);
    assert_eq!(line, "\"archive_ready\",\"OK\",\"3 pending archive-ready files\"");
}

#[test]
fn test_optlines_format_is_machine_parseable() {
    let result = archive_ready_result(Some(60), 10, 50);
    let (line, _) = render(&[result], OutputFormat::Optlines);
    assert!(line.starts_with("--archive_ready=CRITICAL"), "line: {line}");
    assert!(line.contains("--files=60;10;50"), "line: {line}");
}

#[test]
fn test_text_format_one_line_per_check() {
    let results = vec![
        archive_ready_result(Some(0), 10, 50),
        CheckResult {
            name: "role",
            status: CheckStatus::Ok,
            message: "registered as standby, in recovery: yes".to_string(),
            perf: None,
        },
    ];
    let (text, _) = render(&results, OutputFormat::Text);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("archive_ready: OK"));
    assert!(lines[1].starts_with("role: OK"));
}

#[test]
fn test_nagios_exit_codes() {
    assert_eq!(CheckStatus::Ok.nagios_code(), 0);
    assert_eq!(CheckStatus::Warning.nagios_code(), 1);
    assert_eq!(CheckStatus::Critical.nagios_code(), 2);
    assert_eq!(CheckStatus::Unknown.nagios_code(), 3);
}

#[test]
fn test_format_parsing() {
    assert_eq!("nagios".parse::<OutputFormat>().unwrap(), OutputFormat::Nagios);
    assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
    assert!("xml".parse::<OutputFormat>().is_err());
}
