use crate::errors::ChallengeError;
use crate::models::{
    BathRecord, ChallengeOutcome, ChallengeState, ChallengeStatusResponse, DEFAULT_CHALLENGE_DAYS,
    MAX_CHALLENGE_DAYS, Profile, ProfileUpdate, UserId,
};
use crate::stats::{compute_my_progress_days, missed_days};
use crate::storage::Store;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Challenge runs whose terminal transition has already been applied.
#[derive(Debug, Default)]
pub struct TransitionGuard {
    settled: Mutex<HashSet<Uuid>>,
}

impl TransitionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for the first caller per run.
    pub fn claim(&self, run_id: Uuid) -> bool {
        let mut settled = self.settled.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        settled.insert(run_id)
    }

    pub fn release(&self, run_id: Uuid) {
        let mut settled = self.settled.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        settled.remove(&run_id);
    }
}

pub fn validate_length(days: u32) -> Result<(), ChallengeError> {
    if days == 0 || days > MAX_CHALLENGE_DAYS {
        return Err(ChallengeError::validation(format!(
            "challenge length must be between 1 and {MAX_CHALLENGE_DAYS} days"
        )));
    }
    Ok(())
}

pub async fn load_profile<S: Store>(store: &S, user: UserId) -> Result<Profile, ChallengeError> {
    store
        .get_profile(user)
        .await?
        .ok_or_else(|| ChallengeError::NotFound("profile".to_string()))
}

pub async fn start<S: Store>(
    store: &S,
    user: UserId,
    days: u32,
    today: NaiveDate,
    force: bool,
) -> Result<ChallengeState, ChallengeError> {
    validate_length(days)?;
    let profile = load_profile(store, user).await?;
    if profile.challenge.active && !force {
        return Err(ChallengeError::validation(
            "a challenge is already running, restart it with force",
        ));
    }

    let run_id = Uuid::new_v4();
    let state = ChallengeState {
        run_id: Some(run_id),
        ..ChallengeState::started(today, days)
    };
    store.update_profile(user, ProfileUpdate::challenge(state)).await?;
    store.log_challenge_start(user, run_id, today, days).await?;
    info!(%user, %today, days, %run_id, "challenge started");
    Ok(state)
}

pub async fn cancel<S: Store>(store: &S, user: UserId) -> Result<ChallengeState, ChallengeError> {
    let profile = load_profile(store, user).await?;
    if !profile.challenge.active {
        return Err(ChallengeError::validation("no challenge is running"));
    }

    let state = ChallengeState::inactive(profile.challenge.length_days);
    store.update_profile(user, ProfileUpdate::challenge(state)).await?;
    info!(%user, "challenge cancelled");
    Ok(state)
}

/// Stamps the run's log entry and resets the profile. Safe to repeat for the
/// same run; a superseded run is never stamped by a later one.
pub async fn complete_and_reset<S: Store>(
    store: &S,
    user: UserId,
    run_id: Uuid,
    completed_at: DateTime<Utc>,
) -> Result<ChallengeState, ChallengeError> {
    store.log_challenge_completion(user, run_id, completed_at).await?;
    reset(store, user).await
}

pub async fn fail_and_reset<S: Store>(store: &S, user: UserId) -> Result<ChallengeState, ChallengeError> {
    reset(store, user).await
}

async fn reset<S: Store>(store: &S, user: UserId) -> Result<ChallengeState, ChallengeError> {
    let state = ChallengeState::inactive(DEFAULT_CHALLENGE_DAYS);
    store.update_profile(user, ProfileUpdate::challenge(state)).await?;
    Ok(state)
}

/// Terminal outcome of a running challenge as of `today`, if any.
///
/// Completion wins over failure. A challenge fails once a closed day since
/// the start has no bath; the start day itself never fails.
pub fn evaluate(
    state: &ChallengeState,
    activities: &[BathRecord],
    today: NaiveDate,
) -> Option<ChallengeOutcome> {
    let started_at = state.running_since()?;
    if compute_my_progress_days(activities, Some(started_at), today) >= state.length_days {
        return Some(ChallengeOutcome::Completed);
    }
    if missed_days(activities, started_at, today) > 0 {
        return Some(ChallengeOutcome::Failed);
    }
    None
}

/// Once-per-load transition check. Side effects for a given challenge run
/// happen at most once; later calls report no outcome.
pub async fn refresh<S: Store>(
    store: &S,
    guard: &TransitionGuard,
    user: UserId,
    today: NaiveDate,
) -> Result<ChallengeStatusResponse, ChallengeError> {
    let profile = load_profile(store, user).await?;
    let activities = store.fetch_bath_records(user).await?;
    let progress =
        compute_my_progress_days(&activities, profile.challenge.running_since(), today);

    let pending = evaluate(&profile.challenge, &activities, today)
        .zip(profile.challenge.running_run())
        .zip(profile.challenge.running_since());
    let Some(((outcome, run_id), started_at)) = pending else {
        return Ok(ChallengeStatusResponse {
            challenge: profile.challenge,
            progress,
            outcome: None,
        });
    };

    if !guard.claim(run_id) {
        return Ok(ChallengeStatusResponse {
            challenge: profile.challenge,
            progress,
            outcome: None,
        });
    }

    let applied = match outcome {
        ChallengeOutcome::Completed => complete_and_reset(store, user, run_id, Utc::now()).await,
        ChallengeOutcome::Failed => fail_and_reset(store, user).await,
    };
    let challenge = match applied {
        Ok(state) => state,
        Err(err) => {
            guard.release(run_id);
            warn!(%user, error = %err, "challenge transition failed");
            return Err(err);
        }
    };

    info!(%user, %started_at, %run_id, ?outcome, progress, "challenge finished");
    Ok(ChallengeStatusResponse {
        challenge,
        progress,
        outcome: Some(outcome),
    })
}
