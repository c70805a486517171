// src/core/conn.rs

//! Session handling for connections to UxsinoDB instances.
//!
//! Every session is opened from a keyword/value parameter list, drives its
//! wire connection on a background task, and is torn down by the caller on
//! every exit path; nothing here retains connections between call sites.

use crate::core::conninfo::{ConnInfo, DEFAULT_APPLICATION_NAME};
use crate::core::errors::{UxMgrError, UxMgrResult};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(6);
const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of `wait_available`: mirrors the engine's three-way socket poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Ready,
    Error,
    TimedOut,
}

/// An open session to one UxsinoDB instance.
///
/// The caller owns the lifetime of the handle; dropping it aborts the
/// connection-driving task and closes the socket.
pub struct UxSession {
    client: Client,
    driver: JoinHandle<()>,
    conninfo: ConnInfo,
    replication: bool,
}

impl UxSession {
    /// Opens a session from a conninfo string.
    pub async fn open_str(conninfo: &str) -> UxMgrResult<Self> {
        let params = ConnInfo::parse(conninfo)?;
        Self::open(&params).await
    }

    /// Opens a session from a parameter list.
    ///
    /// On success the session has a narrowed lookup path and local commit
    /// synchronisation already applied.
    pub async fn open(params: &ConnInfo) -> UxMgrResult<Self> {
        let mut params = params.clone();
        params.set_default("application_name", DEFAULT_APPLICATION_NAME);
        let session = Self::establish(params, false).await?;
        session.apply_session_settings().await?;
        Ok(session)
    }

    /// Opens a replication-protocol session derived from `params`.
    ///
    /// Replication sessions skip the commit-synchronisation tweak: the
    /// walsender rejects ordinary SET statements.
    pub async fn open_replication(params: &ConnInfo, replication_user: &str) -> UxMgrResult<Self> {
        let mut params = params.for_replication(replication_user);
        params.set_default("application_name", DEFAULT_APPLICATION_NAME);
        Self::establish(params, true).await
    }

    /// Duplicates this session's parameter set into a new session,
    /// optionally substituting the connecting role.
    pub async fn duplicate(&self, user: Option<&str>) -> UxMgrResult<Self> {
        let params = self.conninfo.with_user(user);
        if self.replication {
            let user = params.get("user").unwrap_or_default().to_string();
            Self::open_replication(&params, &user).await
        } else {
            Self::open(&params).await
        }
    }

    async fn establish(params: ConnInfo, replication: bool) -> UxMgrResult<Self> {
        let conninfo_str = params.to_string();
        let connect = tokio_postgres::connect(&conninfo_str, NoTls);
        let (client, connection) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| {
                UxMgrError::DbConn(format!(
                    "timeout connecting to \"{}\"",
                    redacted(&params)
                ))
            })?
            .map_err(|e| UxMgrError::DbConn(e.to_string()))?;

        // The connection object performs the actual wire traffic; run it on
        // its own task for the lifetime of the session.
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                if e.is_closed() {
                    debug!("session connection closed: {e}");
                } else {
                    warn!("session connection error: {e}");
                }
            }
        });

        Ok(Self {
            client,
            driver,
            conninfo: params,
            replication,
        })
    }

    /// Narrows the lookup path to defeat search-path injection and pins the
    /// commit-synchronisation mode to "local" so a standby outage never
    /// blocks this session on cross-node commit acknowledgement.
    async fn apply_session_settings(&self) -> UxMgrResult<()> {
        self.client
            .batch_execute(
                "SET search_path TO uxmgr, ux_catalog; SET synchronous_commit TO local",
            )
            .await?;
        Ok(())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    pub fn conninfo(&self) -> &ConnInfo {
        &self.conninfo
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Sends a trivial query to verify the session is alive.
    pub async fn ping(&self) -> bool {
        matches!(
            tokio::time::timeout(PING_TIMEOUT, self.client.simple_query("SELECT 1")).await,
            Ok(Ok(_))
        )
    }

    /// Pings, and on failure re-establishes the connection once before
    /// retrying. `Ok` carries the surviving (possibly replaced) session;
    /// `Err` means the instance is unreachable and the handle is gone.
    pub async fn ping_with_reset(self) -> UxMgrResult<Self> {
        if self.ping().await {
            return Ok(self);
        }
        let params = self.conninfo.clone();
        let replication = self.replication;
        self.close();
        let fresh = Self::establish(params, replication).await?;
        if !replication {
            fresh.apply_session_settings().await?;
        }
        if fresh.ping().await {
            Ok(fresh)
        } else {
            Err(UxMgrError::DbConn(
                "instance unreachable after connection reset".to_string(),
            ))
        }
    }

    /// Best-effort, time-boxed cancellation of whatever the session is
    /// currently executing.
    pub async fn cancel_query(&self, budget: Duration) {
        let token = self.client.cancel_token();
        if tokio::time::timeout(budget, token.cancel_query(NoTls))
            .await
            .is_err()
        {
            warn!("query cancellation timed out after {budget:?}");
        }
    }

    /// Polls the session until it answers, errors, or the microsecond budget
    /// is exhausted.
    pub async fn wait_available(&self, budget: Duration) -> WaitResult {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            if self.client.is_closed() {
                return WaitResult::Error;
            }
            if self.ping().await {
                return WaitResult::Ready;
            }
            if tokio::time::Instant::now() >= deadline {
                return WaitResult::TimedOut;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Closes the session, aborting the connection-driving task.
    pub fn close(self) {
        self.driver.abort();
    }
}

impl Drop for UxSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Renders a parameter list for log output with the password elided.
fn redacted(params: &ConnInfo) -> String {
    let mut copy = params.clone();
    if copy.get("password").is_some() {
        copy.set("password", "********");
    }
    copy.to_string()
}
