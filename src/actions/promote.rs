// src/actions/promote.rs

//! `standby promote`: manual promotion of the local standby.

use crate::cli::CliArgs;
use crate::config::Config;
use crate::core::catalog::{engine, event_names, events, nodes};
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::vip::VipArbitrator;
use crate::daemon::failover::perform_promotion;
use tracing::{info, warn};

use super::connect_local;

pub async fn run(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    let mut local = connect_local(config).await?;
    if !engine::is_in_recovery(&local).await? {
        return Err(UxMgrError::Consistency(
            "this node is not in recovery; nothing to promote".to_string(),
        ));
    }

    let record = nodes::get_node_record(&local, config.node.node_id)
        .await?
        .ok_or_else(|| {
            UxMgrError::NotFound(format!(
                "node {} is not registered in the catalog",
                config.node.node_id
            ))
        })?;

    // Refuse while the registered primary still answers, unless forced:
    // promoting alongside a live primary splits the cluster.
    if !args.has("force") {
        if let Ok(Some(primary)) = nodes::get_primary_node_record(&local).await {
            if let Ok(sess) = crate::core::conn::UxSession::open_str(&primary.conninfo).await {
                if sess.ping().await && !engine::is_in_recovery(&sess).await.unwrap_or(true) {
                    return Err(UxMgrError::Consistency(format!(
                        "registered primary \"{}\" is still reachable; use --force to promote anyway",
                        primary.node_name
                    )));
                }
            }
        }
    }

    info!("promoting node {}", record.node_id);
    perform_promotion(config, &local).await?;

    let promoted =
        engine::wait_for_promotion(&local, config.failover.promote_check_timeout).await?;
    if !promoted {
        return Err(UxMgrError::PromotionFailed(format!(
            "node did not leave recovery within {:?}",
            config.failover.promote_check_timeout
        )));
    }

    nodes::update_node_record_set_primary(&mut local, record.node_id).await?;

    events::record_event(
        &local,
        &config.events.notification_settings(),
        record.node_id,
        &record.node_name,
        event_names::STANDBY_PROMOTE,
        true,
        &format!("node {} promoted to primary", record.node_id),
    )
    .await;

    let addresses = config.vip.addresses();
    if !addresses.is_empty() {
        let arbitrator = VipArbitrator::new(addresses, config.vip.command_config());
        if let Err(e) = arbitrator.bind_all() {
            warn!("virtual address takeover failed: {e}");
        }
    }

    println!(
        "standby \"{}\" (ID: {}) promoted to primary",
        record.node_name, record.node_id
    );
    Ok(())
}
