// src/actions/check.rs

//! `node check`: threshold-driven health sub-checks with text, CSV,
//! nagios-plugin and option-style output formats.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{NodeType, engine, nodes, shared, slots};
use crate::core::datadir::archive::ready_file_count;
use crate::core::errors::{UxMgrError, UxMgrResult};
use std::str::FromStr;
use strum_macros::Display;

use super::connect_local;

/// Severity of one sub-check. Ordering matters: the aggregate result is the
/// worst individual one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum CheckStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl CheckStatus {
    /// Nagios-plugin exit codes.
    pub fn nagios_code(self) -> i32 {
        match self {
            CheckStatus::Ok => 0,
            CheckStatus::Warning => 1,
            CheckStatus::Critical => 2,
            CheckStatus::Unknown => 3,
        }
    }
}

/// Result of one sub-check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
    /// Nagios performance-data fragment, e.g. `files=60;10;50`.
    pub perf: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Csv,
    Nagios,
    Optlines,
}

impl FromStr for OutputFormat {
    type Err = UxMgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "csv" => Ok(OutputFormat::Csv),
            "nagios" => Ok(OutputFormat::Nagios),
            "optlines" => Ok(OutputFormat::Optlines),
            other => Err(UxMgrError::Config(format!("unknown output format \"{other}\""))),
        }
    }
}

/// Evaluates a count against warning/critical thresholds.
pub fn threshold_status(value: usize, warning: usize, critical: usize) -> CheckStatus {
    if value >= critical {
        CheckStatus::Critical
    } else if value >= warning {
        CheckStatus::Warning
    } else {
        CheckStatus::Ok
    }
}

/// The archive-ready sub-check, separated out so the threshold and
/// perf-data behaviour is testable without an engine.
pub fn archive_ready_result(
    count: Option<usize>,
    warning: usize,
    critical: usize,
) -> CheckResult {
    match count {
        Some(count) => {
            let status = threshold_status(count, warning, critical);
            CheckResult {
                name: "archive_ready",
                status,
                message: format!("{count} pending archive-ready files"),
                perf: Some(format!("files={count};{warning};{critical}")),
            }
        }
        None => CheckResult {
            name: "archive_ready",
            status: CheckStatus::Unknown,
            message: "archive-status directory is not readable".to_string(),
            perf: None,
        },
    }
}

pub fn replication_lag_result(lag_secs: i64, warning: i64, critical: i64) -> CheckResult {
    let status = if lag_secs >= critical {
        CheckStatus::Critical
    } else if lag_secs >= warning {
        CheckStatus::Warning
    } else {
        CheckStatus::Ok
    };
    CheckResult {
        name: "replication_lag",
        status,
        message: format!("replication lag is {lag_secs}s"),
        perf: Some(format!("lag={lag_secs};{warning};{critical}")),
    }
}

/// Renders results in the requested format. The aggregate status is
/// returned so the caller can surface a nagios-style exit code.
pub fn render(results: &[CheckResult], format: OutputFormat) -> (String, CheckStatus) {
    let aggregate = results
        .iter()
        .map(|r| r.status)
        .max()
        .unwrap_or(CheckStatus::Unknown);

    let rendered = match format {
        OutputFormat::Text => results
            .iter()
            .map(|r| format!("{}: {} ({})", r.name, r.status, r.message))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Csv => results
            .iter()
            .map(|r| format!("\"{}\",\"{}\",\"{}\"", r.name, r.status, r.message))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Nagios => {
            let messages = results
                .iter()
                .map(|r| format!("{}: {}", r.name, r.message))
                .collect::<Vec<_>>()
                .join(", ");
            let perf = results
                .iter()
                .filter_map(|r| r.perf.clone())
                .collect::<Vec<_>>()
                .join(" ");
            if perf.is_empty() {
                format!("UXMGR {aggregate} - {messages}")
            } else {
                format!("UXMGR {aggregate} - {messages} | {perf}")
            }
        }
        OutputFormat::Optlines => results
            .iter()
            .map(|r| {
                let mut line = format!("--{}={}", r.name, r.status);
                if let Some(perf) = &r.perf {
                    for item in perf.split(' ') {
                        if let Some((key, value)) = item.split_once('=') {
                            line.push_str(&format!(" --{key}={value}"));
                        }
                    }
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };

    (rendered, aggregate)
}

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let format: OutputFormat = args
        .value_parsed("format")?
        .unwrap_or_default();

    // A single named sub-check restricts the run; default is all of them.
    let selected: Option<&str> = [
        "archive-ready",
        "downstream",
        "upstream",
        "replication-lag",
        "role",
        "slots",
        "data-directory-config",
        "repmgrd",
    ]
    .into_iter()
    .find(|name| args.has(name));

    let local = connect_local(config).await?;
    let record = nodes::get_node_record(&local, config.node.node_id)
        .await?
        .ok_or_else(|| {
            UxMgrError::NotFound(format!(
                "node {} is not registered in the catalog",
                config.node.node_id
            ))
        })?;

    let mut results: Vec<CheckResult> = Vec::new();
    let wants = |name: &str| selected.is_none() || selected == Some(name);

    if wants("archive-ready") {
        let count = ready_file_count(&config.node.data_directory).ok();
        results.push(archive_ready_result(
            count,
            config.thresholds.archive_ready_warning,
            config.thresholds.archive_ready_critical,
        ));
    }

    if wants("replication-lag") {
        let replinfo = engine::get_replication_info(&local).await?;
        if replinfo.in_recovery {
            results.push(replication_lag_result(
                replinfo.replication_lag_secs,
                config.thresholds.replication_lag_warning,
                config.thresholds.replication_lag_critical,
            ));
        }
    }

    if wants("role") {
        let in_recovery = engine::is_in_recovery(&local).await?;
        let consistent = match record.node_type {
            NodeType::Primary => !in_recovery,
            NodeType::Standby => in_recovery,
            NodeType::Witness | NodeType::Unknown => true,
        };
        results.push(CheckResult {
            name: "role",
            status: if consistent { CheckStatus::Ok } else { CheckStatus::Critical },
            message: format!(
                "registered as {}, in recovery: {}",
                record.node_type,
                if in_recovery { "yes" } else { "no" }
            ),
            perf: None,
        });
    }

    if wants("downstream") {
        let expected = nodes::get_downstream_node_records(&local, record.node_id)
            .await?
            .into_iter()
            .filter(|n| n.active && n.node_type == NodeType::Standby)
            .count();
        let attached = engine::get_attached_standby_names(&local).await?.len();
        results.push(CheckResult {
            name: "downstream",
            status: if attached >= expected { CheckStatus::Ok } else { CheckStatus::Critical },
            message: format!("{attached} of {expected} expected downstream nodes attached"),
            perf: Some(format!("attached={attached};;{expected}")),
        });
    }

    if wants("upstream") {
        if let Some(upstream_id) = record.upstream_node_id {
            let replinfo = engine::get_replication_info(&local).await?;
            results.push(CheckResult {
                name: "upstream",
                status: if replinfo.receiving_streamed_wal {
                    CheckStatus::Ok
                } else {
                    CheckStatus::Critical
                },
                message: format!(
                    "upstream node {upstream_id}, streaming: {}",
                    if replinfo.receiving_streamed_wal { "yes" } else { "no" }
                ),
                perf: None,
            });
        }
    }

    if wants("slots") {
        let all_slots = slots::get_physical_slots(&local).await?;
        let inactive = all_slots.iter().filter(|s| !s.active).count();
        let mut missing = 0usize;
        for node in nodes::get_downstream_node_records(&local, record.node_id).await? {
            if let Some(slot_name) = &node.slot_name {
                if node.active && !all_slots.iter().any(|s| &s.slot_name == slot_name) {
                    missing += 1;
                }
            }
        }
        let status = if missing > 0 {
            CheckStatus::Critical
        } else if inactive > 0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Ok
        };
        results.push(CheckResult {
            name: "slots",
            status,
            message: format!("{missing} missing, {inactive} inactive physical slots"),
            perf: Some(format!("missing={missing} inactive={inactive}")),
        });
    }

    if wants("data-directory-config") {
        let setting = engine::get_data_directory_setting(&local).await?;
        let configured = config.node.data_directory.display().to_string();
        let matches = setting.trim_end_matches('/') == configured.trim_end_matches('/');
        results.push(CheckResult {
            name: "data_directory_config",
            status: if matches { CheckStatus::Ok } else { CheckStatus::Critical },
            message: if matches {
                format!("data directory is \"{setting}\"")
            } else {
                format!("configured \"{configured}\" but engine reports \"{setting}\"")
            },
            perf: None,
        });
    }

    if wants("repmgrd") {
        let running = shared::daemon_is_running(&local).await.unwrap_or(false);
        results.push(CheckResult {
            name: "repmgrd",
            status: if running { CheckStatus::Ok } else { CheckStatus::Warning },
            message: format!("daemon {}", if running { "running" } else { "not running" }),
            perf: None,
        });
    }

    let (rendered, aggregate) = render(&results, format);
    println!("{rendered}");

    if format == OutputFormat::Nagios && aggregate != CheckStatus::Ok {
        std::process::exit(aggregate.nagios_code());
    }
    Ok(())
}
