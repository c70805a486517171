// src/core/notify.rs

//! Event-notification command dispatch.
//!
//! Every event appended to the catalog's event log can additionally trigger
//! an operator-configured shell command. Dispatch is best-effort by design:
//! a failing notification command never aborts the action that produced the
//! event.

use crate::core::exec::{EventTemplateContext, expand_event_template, local_command};
use tracing::{debug, warn};

/// Notification settings lifted from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    /// Template executed per event; `None` disables dispatch.
    pub command: Option<String>,
    /// When non-empty, only the listed event names are dispatched.
    pub event_allow_list: Vec<String>,
}

impl NotificationSettings {
    fn wants(&self, event: &str) -> bool {
        self.event_allow_list.is_empty() || self.event_allow_list.iter().any(|e| e == event)
    }
}

/// Expands and runs the notification command for one event.
pub async fn dispatch(settings: &NotificationSettings, ctx: &EventTemplateContext) {
    let Some(template) = &settings.command else {
        return;
    };
    if !settings.wants(&ctx.event) {
        debug!(
            "event \"{}\" not in notification allow-list, skipping",
            ctx.event
        );
        return;
    }

    let cmd = expand_event_template(template, ctx);
    match local_command(&cmd).await {
        Ok(out) if out.success => {
            debug!("notification command for \"{}\" succeeded", ctx.event);
        }
        Ok(out) => {
            warn!(
                "notification command for \"{}\" exited {}: {}",
                ctx.event,
                out.exit_code,
                out.stderr.trim()
            );
        }
        Err(e) => {
            warn!("notification command for \"{}\" failed: {}", ctx.event, e);
        }
    }
}
