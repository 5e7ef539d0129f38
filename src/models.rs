use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::validation::{
    validate_display_name, validate_duration, validate_feeling, validate_idempotency_key,
    validate_phone, validate_proof_url,
};

pub type UserId = Uuid;

pub const DEFAULT_CHALLENGE_DAYS: u32 = 30;
pub const MAX_CHALLENGE_DAYS: u32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BathType {
    Tub,
    Shower,
    Outside,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BathRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_seconds: u32,
    pub feeling: String,
    pub proof_url: Option<String>,
    #[serde(rename = "type")]
    pub kind: BathType,
    pub idempotency_key: String,
}

/// Per-user challenge state. `started_at` and `run_id` are `Some` exactly
/// when `active`; every start gets a fresh `run_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeState {
    pub active: bool,
    pub started_at: Option<NaiveDate>,
    pub length_days: u32,
    #[serde(default)]
    pub run_id: Option<Uuid>,
}

impl Default for ChallengeState {
    fn default() -> Self {
        Self::inactive(DEFAULT_CHALLENGE_DAYS)
    }
}

impl ChallengeState {
    pub fn started(started_at: NaiveDate, length_days: u32) -> Self {
        Self {
            active: true,
            started_at: Some(started_at),
            length_days,
            run_id: Some(Uuid::new_v4()),
        }
    }

    pub fn inactive(length_days: u32) -> Self {
        Self {
            active: false,
            started_at: None,
            length_days,
            run_id: None,
        }
    }

    /// Start date of the running challenge, if any.
    pub fn running_since(&self) -> Option<NaiveDate> {
        if self.active { self.started_at } else { None }
    }

    /// Id of the running challenge, if any.
    pub fn running_run(&self) -> Option<Uuid> {
        if self.active { self.run_id } else { None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub challenge: ChallengeState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub phone: Option<Option<String>>,
    pub challenge: Option<ChallengeState>,
}

impl ProfileUpdate {
    pub fn challenge(state: ChallengeState) -> Self {
        Self {
            challenge: Some(state),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
}

/// One direction of a friendship. Accepted friendships are stored as two edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEdge {
    pub user_id: UserId,
    pub friend_id: UserId,
    pub status: FriendStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendChallenge {
    pub id: Uuid,
    pub user_id: UserId,
    pub friend_id: UserId,
    pub started_at: NaiveDate,
    pub length_days: u32,
    pub active: bool,
}

impl FriendChallenge {
    pub fn involves(&self, user: UserId) -> bool {
        self.user_id == user || self.friend_id == user
    }

    pub fn links(&self, a: UserId, b: UserId) -> bool {
        (self.user_id == a && self.friend_id == b) || (self.user_id == b && self.friend_id == a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: Uuid,
    pub inviter_id: UserId,
    pub email: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One challenge run. `id` is the run id carried by [`ChallengeState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeLogEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub started_at: NaiveDate,
    pub length_days: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppData {
    pub profiles: Vec<Profile>,
    pub baths: Vec<BathRecord>,
    pub friends: Vec<FriendEdge>,
    pub friend_challenges: Vec<FriendChallenge>,
    pub invites: Vec<Invite>,
    pub challenge_log: Vec<ChallengeLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub total_baths: u64,
    pub completed_challenges: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub days_completed: u32,
    pub total_baths: u64,
    pub longest_bath: String,
    pub average_duration: String,
    pub latest_bath: String,
    pub latest_time: String,
    pub activities: Vec<BathRecord>,
}

/// Shared window of two running challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairWindow {
    pub start: NaiveDate,
    pub length_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeOutcome {
    Completed,
    Failed,
}

// -- Requests --

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProfileRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_display_name"))]
    pub display_name: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_display_name"))]
    pub display_name: Option<String>,
    /// An empty string clears the stored number.
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogBathRequest {
    #[validate(length(min = 1, max = 128), custom(function = "validate_idempotency_key"))]
    pub idempotency_key: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    #[validate(custom(function = "validate_duration"))]
    pub duration: String,
    #[validate(custom(function = "validate_feeling"))]
    pub feeling: String,
    #[validate(custom(function = "validate_proof_url"))]
    pub proof_url: Option<String>,
    #[serde(rename = "type")]
    pub kind: BathType,
}

#[derive(Debug, Deserialize)]
pub struct StartChallengeRequest {
    pub days: u32,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InviteRequest {
    #[validate(email, length(max = 255))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteRequest {
    pub inviter_id: UserId,
}

// -- Responses --

#[derive(Debug, Serialize, Deserialize)]
pub struct LogBathResponse {
    pub inserted: bool,
    pub record: BathRecord,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: Stats,
    pub challenge: ChallengeState,
    pub challenge_progress: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeStatusResponse {
    pub challenge: ChallengeState,
    pub progress: u32,
    pub outcome: Option<ChallengeOutcome>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendSummary {
    pub user_id: UserId,
    pub display_name: String,
    pub status: FriendStatus,
    pub paired: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuddyProgress {
    pub friend_id: UserId,
    pub window: Option<PairWindow>,
    pub my_progress: u32,
    pub friend_progress: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairingOutcome {
    Started { pairing: FriendChallenge },
    NeedsConfirmation { conflicts: Vec<FriendChallenge> },
}
