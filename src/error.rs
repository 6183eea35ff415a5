// Errors surfaced by the ranked entry points.

use crate::db::PlayerId;
use crate::eligibility::EntryDenied;

#[derive(Debug, thiserror::Error)]
pub enum RankedError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error(transparent)]
    Denied(#[from] EntryDenied),
    #[error("player {0} is already in the ranked queue")]
    AlreadyQueued(PlayerId),
    #[error("player {0} is already in a match")]
    InMatch(PlayerId),
    #[error("player {0} has no ranked career")]
    UnknownPlayer(PlayerId),
    #[error("flag {0} does not exist or was already reviewed")]
    FlagNotReviewable(i64),
}
