// src/actions/cluster.rs

//! `cluster` verbs: read-only aggregation (`show`, `event`, `crosscheck`,
//! `matrix`) and the monitoring-history purge (`cleanup`).

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{NodeType, engine, events, monitoring, nodes};
use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use std::time::Duration;
use tracing::warn;

use super::{connect_local, find_primary};

/// `cluster show`: one line per node with role, upstream and reachability.
/// `--csv` emits `id,name,role,active,upstream,location,status` rows for
/// scripting.
pub async fn show(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let records = nodes::get_all_node_records(&local).await?;
    if records.is_empty() {
        println!("no nodes registered");
        return Ok(());
    }
    let csv = args.has("csv");

    if !csv {
        println!(
            "{:>4} | {:<16} | {:<8} | {:<8} | {:>8} | {:<10} | status",
            "ID", "Name", "Role", "Active", "Upstream", "Location"
        );
        println!("{}", "-".repeat(80));
    }
    for record in &records {
        let status = match UxSession::open_str(&record.conninfo).await {
            Ok(sess) => match engine::is_in_recovery(&sess).await {
                Ok(true) => "running (standby)",
                Ok(false) => "running (primary)",
                Err(_) => "unreachable",
            },
            Err(_) => "unreachable",
        };
        let consistent = match (record.node_type, status) {
            (NodeType::Primary, "running (standby)") => false,
            (NodeType::Standby, "running (primary)") => false,
            _ => true,
        };
        let upstream = record
            .upstream_node_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        if csv {
            println!(
                "{},{},{},{},{},{},\"{}\"",
                record.node_id,
                record.node_name,
                record.node_type,
                record.active,
                upstream,
                record.location,
                status,
            );
        } else {
            println!(
                "{:>4} | {:<16} | {:<8} | {:<8} | {:>8} | {:<10} | {}{}",
                record.node_id,
                record.node_name,
                record.node_type.to_string(),
                if record.active { "yes" } else { "no" },
                upstream,
                record.location,
                status,
                if consistent { "" } else { " ! role mismatch" },
            );
        }
    }
    Ok(())
}

/// `cluster event`: recent event-log entries, newest first.
pub async fn event(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let limit: i64 = args.value_parsed("limit")?.unwrap_or(20);
    let node_id: Option<i32> = args.value_parsed("node-id")?;
    let event_type = args.value("event");

    let list = events::get_events(&local, node_id, event_type, limit).await?;
    if list.is_empty() {
        println!("no events recorded");
        return Ok(());
    }
    for ev in list {
        println!(
            "{} | node {:>4} | {:<28} | {} | {}",
            ev.event_timestamp.format("%Y-%m-%d %H:%M:%S%:z"),
            ev.node_id,
            ev.event_type,
            if ev.successful { "ok" } else { "FAILED" },
            ev.details
        );
    }
    Ok(())
}

/// `cluster cleanup`: bounded-age purge of the monitoring history.
pub async fn cleanup(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let (_, primary) = find_primary(&local).await?;
    let keep_days: u64 = args.value_parsed("keep-history")?.unwrap_or(1);
    let removed =
        monitoring::purge_monitoring_history(&primary, Duration::from_secs(keep_days * 86400))
            .await?;
    println!("removed {removed} monitoring-history rows older than {keep_days} day(s)");
    Ok(())
}

/// `cluster crosscheck`: from this node, probe every registered node and
/// flag topology contradictions, double primaries in particular.
pub async fn crosscheck(config: &Config, _args: &CliArgs) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let records = nodes::get_all_node_records(&local).await?;

    let mut primaries = Vec::new();
    for record in &records {
        if !record.active {
            continue;
        }
        let Ok(sess) = UxSession::open_str(&record.conninfo).await else {
            println!("node {:>4} ({}): unreachable", record.node_id, record.node_name);
            continue;
        };
        match engine::is_in_recovery(&sess).await {
            Ok(false) => {
                primaries.push(record.node_id);
                println!("node {:>4} ({}): accepts writes", record.node_id, record.node_name);
            }
            Ok(true) => {
                println!("node {:>4} ({}): in recovery", record.node_id, record.node_name)
            }
            Err(e) => println!("node {:>4} ({}): probe failed: {e}", record.node_id, record.node_name),
        }
    }

    if primaries.len() > 1 {
        warn!("split-brain suspected: nodes {primaries:?} all accept writes");
        println!("WARNING: {} nodes accept writes: {primaries:?}", primaries.len());
        println!("resolve with \"uxmgr node rejoin\" on the stale primary");
        return Err(UxMgrError::Consistency(format!(
            "{} reachable primaries observed",
            primaries.len()
        )));
    }
    println!("crosscheck ok: {} writable primary", primaries.len());
    Ok(())
}

/// One node's view of the cluster: which peers it can reach.
#[derive(Debug, Clone)]
pub struct MatrixRow {
    pub from_node_id: i32,
    /// Per-target outcome in target order: `Some(true)` reachable,
    /// `Some(false)` not, `None` unknown (the row's node was unreachable).
    pub cells: Vec<Option<bool>>,
}

/// Renders a connectivity matrix. `?` marks cells no probe could fill.
pub fn render_matrix(node_ids: &[i32], rows: &[MatrixRow], csv: bool) -> String {
    let mut out = String::new();
    if csv {
        for row in rows {
            for (to, cell) in node_ids.iter().zip(&row.cells) {
                let value = match cell {
                    Some(true) => "ok",
                    Some(false) => "x",
                    None => "?",
                };
                out.push_str(&format!("{},{},{}\n", row.from_node_id, to, value));
            }
        }
        return out;
    }

    out.push_str(&format!("{:>6}", ""));
    for to in node_ids {
        out.push_str(&format!(" {to:>6}"));
    }
    out.push('\n');
    for row in rows {
        out.push_str(&format!("{:>6}", row.from_node_id));
        for cell in &row.cells {
            let value = match cell {
                Some(true) => "ok",
                Some(false) => "x",
                None => "?",
            };
            out.push_str(&format!(" {value:>6}"));
        }
        out.push('\n');
    }
    out
}

/// Parses the `--local` row emitted on a remote node back into a row.
pub fn parse_matrix_row(output: &str, expected_cells: usize) -> Option<MatrixRow> {
    for line in output.lines() {
        let Some(rest) = line.strip_prefix("MATRIX ") else {
            continue;
        };
        let mut fields = rest.split_whitespace();
        let from_node_id: i32 = fields.next()?.parse().ok()?;
        let cells: Vec<Option<bool>> = fields
            .map(|f| match f {
                "ok" => Some(true),
                "x" => Some(false),
                _ => None,
            })
            .collect();
        if cells.len() == expected_cells {
            return Some(MatrixRow {
                from_node_id,
                cells,
            });
        }
    }
    None
}

/// Probes every registered node from here, in catalog order.
async fn probe_row(config: &Config, records: &[crate::core::catalog::NodeRecord]) -> MatrixRow {
    let mut cells = Vec::with_capacity(records.len());
    for to in records {
        let reachable = match UxSession::open_str(&to.conninfo).await {
            Ok(sess) => sess.ping().await,
            Err(_) => false,
        };
        cells.push(Some(reachable));
    }
    MatrixRow {
        from_node_id: config.node.node_id,
        cells,
    }
}

/// `cluster matrix`: full n-by-n connectivity matrix.
///
/// Each remote row is gathered by running `cluster matrix --local` on that
/// node over SSH; with `--local` only this node's row is printed, in the
/// machine-parseable form the aggregator consumes.
pub async fn matrix(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let local = connect_local(config).await?;
    let records = nodes::get_all_node_records(&local).await?;
    let node_ids: Vec<i32> = records.iter().map(|r| r.node_id).collect();

    if args.has("local") {
        let row = probe_row(config, &records).await;
        let cells = row
            .cells
            .iter()
            .map(|c| match c {
                Some(true) => "ok",
                Some(false) => "x",
                None => "?",
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!("MATRIX {} {cells}", row.from_node_id);
        return Ok(());
    }

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        if record.node_id == config.node.node_id {
            rows.push(probe_row(config, &records).await);
            continue;
        }

        let row = match gather_remote_row(config, args, record, node_ids.len()).await {
            Some(row) => row,
            None => {
                warn!(
                    "could not gather matrix row from node {} ({})",
                    record.node_id, record.node_name
                );
                MatrixRow {
                    from_node_id: record.node_id,
                    cells: vec![None; node_ids.len()],
                }
            }
        };
        rows.push(row);
    }

    print!("{}", render_matrix(&node_ids, &rows, args.has("csv")));
    Ok(())
}

async fn gather_remote_row(
    config: &Config,
    args: &CliArgs,
    record: &crate::core::catalog::NodeRecord,
    expected_cells: usize,
) -> Option<MatrixRow> {
    let host = super::node_host(record).ok()?;
    let remote_config = args
        .value("remote-config")
        .unwrap_or(crate::cli::DEFAULT_CONFIG_PATH);
    let cmd = format!("uxmgr -f {remote_config} cluster matrix --local");
    let out = super::remote_command(config, &host, &cmd).await.ok()?;
    if !out.success {
        return None;
    }
    parse_matrix_row(&out.stdout, expected_cells)
}
