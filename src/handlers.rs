use crate::errors::{AppError, ChallengeError};
use crate::models::{
    AcceptInviteRequest, BathRecord, BuddyProgress, ChallengeState, ChallengeStatusResponse,
    CreateProfileRequest, FriendSummary, Invite, InviteRequest, LeaderboardEntry, LogBathRequest,
    LogBathResponse, PairingOutcome, Profile, StartChallengeRequest, StatsResponse,
    UpdateProfileRequest, UserId,
};
use crate::state::AppState;
use crate::stats::{build_stats_at, compute_my_progress_days};
use crate::storage::Store;
use crate::{baths, challenge, friends, profiles};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;

pub const USER_HEADER: &str = "x-user-id";

/// Identity of the caller, taken from the session header.
fn current_user(headers: &HeaderMap) -> Result<UserId, AppError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<UserId>().ok())
        .ok_or_else(AppError::unauthorized)
}

pub async fn create_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    let user = current_user(&headers)?;
    Ok(Json(profiles::create_profile(&state.store, user, payload).await?))
}

pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Profile>, AppError> {
    let user = current_user(&headers)?;
    Ok(Json(challenge::load_profile(&state.store, user).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    let user = current_user(&headers)?;
    Ok(Json(profiles::update_profile(&state.store, user, payload).await?))
}

pub async fn log_bath(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LogBathRequest>,
) -> Result<(StatusCode, Json<LogBathResponse>), AppError> {
    let user = current_user(&headers)?;
    let (record, inserted) = baths::log_bath(
        &state.store,
        user,
        state.clock.today(),
        state.clock.time_now(),
        payload,
    )
    .await?;
    let status = if inserted { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(LogBathResponse { inserted, record })))
}

pub async fn list_baths(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BathRecord>>, AppError> {
    let user = current_user(&headers)?;
    let mut records = state
        .store
        .fetch_bath_records(user)
        .await
        .map_err(ChallengeError::from)?;
    records.sort_by(|a, b| b.date.cmp(&a.date).then(b.time.cmp(&a.time)));
    Ok(Json(records))
}

pub async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, AppError> {
    let user = current_user(&headers)?;
    let profile = challenge::load_profile(&state.store, user).await?;
    let records = state
        .store
        .fetch_bath_records(user)
        .await
        .map_err(ChallengeError::from)?;

    let today = state.clock.today();
    let challenge_progress =
        compute_my_progress_days(&records, profile.challenge.running_since(), today);
    Ok(Json(StatsResponse {
        stats: build_stats_at(today, &records),
        challenge: profile.challenge,
        challenge_progress,
    }))
}

pub async fn start_challenge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StartChallengeRequest>,
) -> Result<Json<ChallengeState>, AppError> {
    let user = current_user(&headers)?;
    let started = challenge::start(
        &state.store,
        user,
        payload.days,
        state.clock.today(),
        payload.force,
    )
    .await?;
    Ok(Json(started))
}

pub async fn cancel_challenge(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChallengeState>, AppError> {
    let user = current_user(&headers)?;
    Ok(Json(challenge::cancel(&state.store, user).await?))
}

pub async fn refresh_challenge(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChallengeStatusResponse>, AppError> {
    let user = current_user(&headers)?;
    let status = challenge::refresh(&state.store, &state.guard, user, state.clock.today()).await?;
    Ok(Json(status))
}

pub async fn list_friends(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<FriendSummary>>, AppError> {
    let user = current_user(&headers)?;
    Ok(Json(friends::list_friends(&state.store, user).await?))
}

pub async fn unfriend(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(friend): Path<UserId>,
) -> Result<StatusCode, AppError> {
    let user = current_user(&headers)?;
    friends::unfriend(&state.store, user, friend).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_paired_challenge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(friend): Path<UserId>,
    Json(payload): Json<StartChallengeRequest>,
) -> Result<Json<PairingOutcome>, AppError> {
    let user = current_user(&headers)?;
    let outcome = friends::start_paired_challenge(
        &state.store,
        user,
        friend,
        payload.days,
        payload.force,
        state.clock.today(),
    )
    .await?;
    Ok(Json(outcome))
}

pub async fn buddy_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(friend): Path<UserId>,
) -> Result<Json<BuddyProgress>, AppError> {
    let user = current_user(&headers)?;
    let progress = friends::buddy_progress(&state.store, user, friend, state.clock.today()).await?;
    Ok(Json(progress))
}

pub async fn create_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<InviteRequest>,
) -> Result<(StatusCode, Json<Invite>), AppError> {
    let user = current_user(&headers)?;
    let invite = friends::create_invite(&state.store, user, payload, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

pub async fn accept_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AcceptInviteRequest>,
) -> Result<StatusCode, AppError> {
    let user = current_user(&headers)?;
    friends::finalize_invite(&state.store, payload.inviter_id, user, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leaderboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let entries = state.store.leaderboard().await.map_err(ChallengeError::from)?;
    Ok(Json(entries))
}
