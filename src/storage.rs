use crate::errors::StoreError;
use crate::models::{
    AppData, BathRecord, ChallengeLogEntry, FriendChallenge, FriendEdge, FriendStatus, Invite,
    LeaderboardEntry, Profile, ProfileUpdate, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs, sync::Mutex};
use tracing::{debug, error};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract used by the challenge, friend and bath operations.
///
/// Every call is independent; multi-step operations built on top of it are
/// not transactional.
pub trait Store: Send + Sync {
    fn fetch_bath_records(&self, user: UserId)
    -> impl Future<Output = StoreResult<Vec<BathRecord>>> + Send;

    /// Inserts unless a record with the same idempotency key exists. Returns
    /// the stored record and whether it was newly inserted.
    fn insert_bath_record(
        &self,
        record: BathRecord,
    ) -> impl Future<Output = StoreResult<(BathRecord, bool)>> + Send;

    fn get_profile(&self, user: UserId) -> impl Future<Output = StoreResult<Option<Profile>>> + Send;

    /// Inserts unless a profile exists for the user. Returns the stored profile.
    fn insert_profile(&self, profile: Profile) -> impl Future<Output = StoreResult<Profile>> + Send;

    fn update_profile(
        &self,
        user: UserId,
        update: ProfileUpdate,
    ) -> impl Future<Output = StoreResult<Profile>> + Send;

    fn get_friend_edges(&self, user: UserId)
    -> impl Future<Output = StoreResult<Vec<FriendEdge>>> + Send;

    /// Inserts the directed edge unless it exists. Returns whether it was inserted.
    fn insert_friend_edge(
        &self,
        user: UserId,
        friend: UserId,
        status: FriendStatus,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Deletes both directions. Returns the number of edges removed.
    fn delete_friend_edges(&self, a: UserId, b: UserId)
    -> impl Future<Output = StoreResult<usize>> + Send;

    /// Active pairings where the user is on either side.
    fn active_challenge_pairs(
        &self,
        user: UserId,
    ) -> impl Future<Output = StoreResult<Vec<FriendChallenge>>> + Send;

    /// Deactivates every active row between `a` and `b`, both directions.
    fn deactivate_challenge_pair(
        &self,
        a: UserId,
        b: UserId,
    ) -> impl Future<Output = StoreResult<usize>> + Send;

    fn insert_challenge_pair(
        &self,
        pairing: FriendChallenge,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Deletes every row between `a` and `b`, active or not, both directions.
    fn delete_challenge_pairs(
        &self,
        a: UserId,
        b: UserId,
    ) -> impl Future<Output = StoreResult<usize>> + Send;

    /// Appends the log entry for a run; `run_id` becomes the entry id.
    fn log_challenge_start(
        &self,
        user: UserId,
        run_id: Uuid,
        started_at: NaiveDate,
        length_days: u32,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Stamps the entry of the given run. An already stamped entry is left as is.
    fn log_challenge_completion(
        &self,
        user: UserId,
        run_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn insert_invite(&self, invite: Invite) -> impl Future<Output = StoreResult<()>> + Send;

    /// Whether the inviter ever invited the email, used or not.
    fn has_invite(
        &self,
        inviter: UserId,
        email: &str,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Marks unused invites for the inviter/email pair as used. Returns how many changed.
    fn mark_invites_used(
        &self,
        inviter: UserId,
        email: &str,
        used_at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<usize>> + Send;

    fn leaderboard(&self) -> impl Future<Output = StoreResult<Vec<LeaderboardEntry>>> + Send;
}

/// JSON document store. Each write persists the whole document when a path is set.
#[derive(Clone)]
pub struct JsonStore {
    data_path: Option<PathBuf>,
    data: Arc<Mutex<AppData>>,
}

impl JsonStore {
    pub async fn open(path: PathBuf) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let data = load_data(&path).await;
        Ok(Self {
            data_path: Some(path),
            data: Arc::new(Mutex::new(data)),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            data_path: None,
            data: Arc::new(Mutex::new(AppData::default())),
        }
    }

    async fn persist(&self, data: &AppData) -> StoreResult<()> {
        match &self.data_path {
            Some(path) => persist_data(path, data).await,
            None => Ok(()),
        }
    }

    pub async fn snapshot(&self) -> AppData {
        self.data.lock().await.clone()
    }
}

pub async fn load_data(path: &Path) -> AppData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse data file: {err}");
                AppData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppData::default(),
        Err(err) => {
            error!("failed to read data file: {err}");
            AppData::default()
        }
    }
}

pub async fn persist_data(path: &Path, data: &AppData) -> StoreResult<()> {
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}

impl Store for JsonStore {
    async fn fetch_bath_records(&self, user: UserId) -> StoreResult<Vec<BathRecord>> {
        let data = self.data.lock().await;
        Ok(data
            .baths
            .iter()
            .filter(|record| record.user_id == user)
            .cloned()
            .collect())
    }

    async fn insert_bath_record(&self, record: BathRecord) -> StoreResult<(BathRecord, bool)> {
        let mut data = self.data.lock().await;
        if let Some(existing) = data
            .baths
            .iter()
            .find(|existing| existing.idempotency_key == record.idempotency_key)
        {
            debug!(key = %record.idempotency_key, "duplicate bath submission ignored");
            return Ok((existing.clone(), false));
        }
        data.baths.push(record.clone());
        self.persist(&data).await?;
        Ok((record, true))
    }

    async fn get_profile(&self, user: UserId) -> StoreResult<Option<Profile>> {
        let data = self.data.lock().await;
        Ok(data.profiles.iter().find(|p| p.user_id == user).cloned())
    }

    async fn insert_profile(&self, profile: Profile) -> StoreResult<Profile> {
        let mut data = self.data.lock().await;
        if let Some(existing) = data.profiles.iter().find(|p| p.user_id == profile.user_id) {
            return Ok(existing.clone());
        }
        data.profiles.push(profile.clone());
        self.persist(&data).await?;
        Ok(profile)
    }

    async fn update_profile(&self, user: UserId, update: ProfileUpdate) -> StoreResult<Profile> {
        let mut data = self.data.lock().await;
        let updated = {
            let profile = data
                .profiles
                .iter_mut()
                .find(|p| p.user_id == user)
                .ok_or_else(|| StoreError::NotFound("profile".to_string()))?;
            if let Some(name) = update.display_name {
                profile.display_name = name;
            }
            if let Some(phone) = update.phone {
                profile.phone = phone;
            }
            if let Some(challenge) = update.challenge {
                profile.challenge = challenge;
            }
            profile.clone()
        };
        self.persist(&data).await?;
        Ok(updated)
    }

    async fn get_friend_edges(&self, user: UserId) -> StoreResult<Vec<FriendEdge>> {
        let data = self.data.lock().await;
        Ok(data
            .friends
            .iter()
            .filter(|edge| edge.user_id == user)
            .cloned()
            .collect())
    }

    async fn insert_friend_edge(
        &self,
        user: UserId,
        friend: UserId,
        status: FriendStatus,
    ) -> StoreResult<bool> {
        let mut data = self.data.lock().await;
        if data
            .friends
            .iter()
            .any(|edge| edge.user_id == user && edge.friend_id == friend)
        {
            return Ok(false);
        }
        data.friends.push(FriendEdge {
            user_id: user,
            friend_id: friend,
            status,
            created_at: Utc::now(),
        });
        self.persist(&data).await?;
        Ok(true)
    }

    async fn delete_friend_edges(&self, a: UserId, b: UserId) -> StoreResult<usize> {
        let mut data = self.data.lock().await;
        let before = data.friends.len();
        data.friends.retain(|edge| {
            !((edge.user_id == a && edge.friend_id == b) || (edge.user_id == b && edge.friend_id == a))
        });
        let removed = before - data.friends.len();
        if removed > 0 {
            self.persist(&data).await?;
        }
        Ok(removed)
    }

    async fn active_challenge_pairs(&self, user: UserId) -> StoreResult<Vec<FriendChallenge>> {
        let data = self.data.lock().await;
        Ok(data
            .friend_challenges
            .iter()
            .filter(|row| row.active && row.involves(user))
            .cloned()
            .collect())
    }

    async fn deactivate_challenge_pair(&self, a: UserId, b: UserId) -> StoreResult<usize> {
        let mut data = self.data.lock().await;
        let mut changed = 0;
        for row in data
            .friend_challenges
            .iter_mut()
            .filter(|row| row.active && row.links(a, b))
        {
            row.active = false;
            changed += 1;
        }
        if changed > 0 {
            self.persist(&data).await?;
        }
        Ok(changed)
    }

    async fn insert_challenge_pair(&self, pairing: FriendChallenge) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        data.friend_challenges.push(pairing);
        self.persist(&data).await
    }

    async fn delete_challenge_pairs(&self, a: UserId, b: UserId) -> StoreResult<usize> {
        let mut data = self.data.lock().await;
        let before = data.friend_challenges.len();
        data.friend_challenges.retain(|row| !row.links(a, b));
        let removed = before - data.friend_challenges.len();
        if removed > 0 {
            self.persist(&data).await?;
        }
        Ok(removed)
    }

    async fn log_challenge_start(
        &self,
        user: UserId,
        run_id: Uuid,
        started_at: NaiveDate,
        length_days: u32,
    ) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if data.challenge_log.iter().any(|entry| entry.id == run_id) {
            return Ok(());
        }
        data.challenge_log.push(ChallengeLogEntry {
            id: run_id,
            user_id: user,
            started_at,
            length_days,
            completed_at: None,
        });
        self.persist(&data).await
    }

    async fn log_challenge_completion(
        &self,
        user: UserId,
        run_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let entry = data
            .challenge_log
            .iter_mut()
            .find(|entry| entry.id == run_id && entry.user_id == user)
            .ok_or_else(|| StoreError::NotFound("challenge log entry".to_string()))?;
        if entry.completed_at.is_some() {
            debug!(%user, %run_id, "challenge run already stamped");
            return Ok(());
        }
        entry.completed_at = Some(completed_at);
        self.persist(&data).await
    }

    async fn insert_invite(&self, invite: Invite) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        data.invites.push(invite);
        self.persist(&data).await
    }

    async fn has_invite(&self, inviter: UserId, email: &str) -> StoreResult<bool> {
        let data = self.data.lock().await;
        Ok(data
            .invites
            .iter()
            .any(|invite| invite.inviter_id == inviter && invite.email.eq_ignore_ascii_case(email)))
    }

    async fn mark_invites_used(
        &self,
        inviter: UserId,
        email: &str,
        used_at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let mut data = self.data.lock().await;
        let mut changed = 0;
        for invite in data.invites.iter_mut().filter(|invite| {
            !invite.used && invite.inviter_id == inviter && invite.email.eq_ignore_ascii_case(email)
        }) {
            invite.used = true;
            invite.used_at = Some(used_at);
            changed += 1;
        }
        if changed > 0 {
            self.persist(&data).await?;
        }
        Ok(changed)
    }

    async fn leaderboard(&self) -> StoreResult<Vec<LeaderboardEntry>> {
        let data = self.data.lock().await;
        let mut baths: HashMap<UserId, u64> = HashMap::new();
        for record in &data.baths {
            *baths.entry(record.user_id).or_default() += 1;
        }
        let mut completed: HashMap<UserId, u64> = HashMap::new();
        for entry in data.challenge_log.iter().filter(|e| e.completed_at.is_some()) {
            *completed.entry(entry.user_id).or_default() += 1;
        }

        let mut entries: Vec<LeaderboardEntry> = data
            .profiles
            .iter()
            .map(|profile| LeaderboardEntry {
                user_id: profile.user_id,
                display_name: profile.display_name.clone(),
                total_baths: baths.get(&profile.user_id).copied().unwrap_or(0),
                completed_challenges: completed.get(&profile.user_id).copied().unwrap_or(0),
            })
            .collect();
        entries.sort_by(|a, b| {
            b.total_baths
                .cmp(&a.total_baths)
                .then(b.completed_challenges.cmp(&a.completed_challenges))
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        Ok(entries)
    }
}
