// src/core/catalog/voting.rs

//! The electoral-term table and the vote-exchange procedures.
//!
//! The term is a single row advanced by read-modify-write, so concurrent
//! election attempts serialise on it: the loser observes an unexpectedly
//! high term and aborts its run.

use crate::core::conn::UxSession;
use crate::core::errors::{UxMgrError, UxMgrResult};
use crate::core::shmem::ELECTION_RERUN_NOTIFICATION;
use tracing::debug;

/// Outcome of announcing this node's candidature to a sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The sibling endorsed the announced candidate.
    Endorsed,
    /// The sibling believes it has a strictly better candidate and asks the
    /// announcer to rerun its evaluation.
    Rerun,
}

/// Current electoral term, `None` before initialisation.
pub async fn get_current_term(sess: &UxSession) -> UxMgrResult<Option<u64>> {
    let row = sess
        .client()
        .query_opt("SELECT term FROM uxmgr.voting_term", &[])
        .await?;
    Ok(row.map(|r| r.get::<_, i64>(0) as u64))
}

/// Seeds the term table with term 1 when empty.
pub async fn initialize_voting_term(sess: &UxSession) -> UxMgrResult<()> {
    sess.client()
        .execute(
            "INSERT INTO uxmgr.voting_term (term) \
             SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM uxmgr.voting_term)",
            &[],
        )
        .await?;
    Ok(())
}

/// Advances the term by one and returns the new value.
pub async fn increment_current_term(sess: &UxSession) -> UxMgrResult<u64> {
    let row = sess
        .client()
        .query_opt(
            "UPDATE uxmgr.voting_term SET term = term + 1 RETURNING term",
            &[],
        )
        .await?;
    match row {
        Some(row) => Ok(row.get::<_, i64>(0) as u64),
        None => Err(UxMgrError::Consistency(
            "voting term table is not initialised".to_string(),
        )),
    }
}

/// Announces `candidate_id`'s candidature for `term` on a sibling's session.
///
/// The sibling records the candidate when the term is newer than its own;
/// the rerun sentinel comes back when it knows a strictly better candidate.
pub async fn announce_candidature(
    sibling: &UxSession,
    candidate_id: i32,
    term: u64,
) -> UxMgrResult<VoteOutcome> {
    let row = sibling
        .client()
        .query_one(
            "SELECT uxmgr.announce_candidature($1, $2)",
            &[&candidate_id, &(term as i64)],
        )
        .await?;
    let observed: i32 = row.get(0);
    if observed == ELECTION_RERUN_NOTIFICATION {
        debug!("sibling requested election rerun for term {term}");
        Ok(VoteOutcome::Rerun)
    } else {
        Ok(VoteOutcome::Endorsed)
    }
}

/// Tells a standby to follow `new_primary_id`; the rerun sentinel instead
/// asks it to re-evaluate its own election state.
pub async fn notify_follow_primary(sess: &UxSession, new_primary_id: i32) -> UxMgrResult<()> {
    sess.client()
        .execute("SELECT uxmgr.notify_follow_primary($1)", &[&new_primary_id])
        .await?;
    Ok(())
}

/// Reads the follow-new-primary notification on a node.
pub async fn get_new_primary(sess: &UxSession) -> UxMgrResult<Option<i32>> {
    let row = sess
        .client()
        .query_one("SELECT uxmgr.get_new_primary()", &[])
        .await?;
    Ok(row.get(0))
}

/// Clears voting status, candidate and follow flag on a node.
pub async fn reset_voting_status(sess: &UxSession) -> UxMgrResult<()> {
    sess.client()
        .execute("SELECT uxmgr.reset_voting_status()", &[])
        .await?;
    Ok(())
}
