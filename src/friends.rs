use crate::challenge::{load_profile, validate_length};
use crate::errors::ChallengeError;
use crate::models::{
    BuddyProgress, ChallengeState, FriendChallenge, FriendStatus, FriendSummary, Invite,
    InviteRequest, PairWindow, PairingOutcome, ProfileUpdate, UserId,
};
use crate::stats::{compute_friend_progress, compute_my_progress_days, distinct_dates, pair_window};
use crate::storage::Store;
use crate::validation::normalize_email;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// The only writer of friend edges. Inserts whichever of the two directions
/// is missing; returns true when anything changed.
pub async fn ensure_friendship<S: Store>(
    store: &S,
    a: UserId,
    b: UserId,
) -> Result<bool, ChallengeError> {
    if a == b {
        return Err(ChallengeError::validation("cannot befriend yourself"));
    }
    let forward = store.insert_friend_edge(a, b, FriendStatus::Accepted).await?;
    let backward = store.insert_friend_edge(b, a, FriendStatus::Accepted).await?;
    if forward || backward {
        info!(%a, %b, "friendship established");
    }
    Ok(forward || backward)
}

async fn require_friend<S: Store>(store: &S, user: UserId, friend: UserId) -> Result<(), ChallengeError> {
    let edges = store.get_friend_edges(user).await?;
    if edges.iter().any(|edge| edge.friend_id == friend) {
        Ok(())
    } else {
        Err(ChallengeError::NotFound("friend".to_string()))
    }
}

pub async fn list_friends<S: Store>(store: &S, user: UserId) -> Result<Vec<FriendSummary>, ChallengeError> {
    let edges = store.get_friend_edges(user).await?;
    let pairs = store.active_challenge_pairs(user).await?;
    let mut friends = Vec::with_capacity(edges.len());
    for edge in edges {
        let display_name = store
            .get_profile(edge.friend_id)
            .await?
            .map(|profile| profile.display_name)
            .unwrap_or_default();
        friends.push(FriendSummary {
            user_id: edge.friend_id,
            display_name,
            status: edge.status,
            paired: pairs.iter().any(|row| row.links(user, edge.friend_id)),
        });
    }
    Ok(friends)
}

/// Starts an explicit challenge between two friends.
///
/// Any active pairing involving either user is a conflict; without `force`
/// nothing is written and the conflicts are returned for confirmation.
pub async fn start_paired_challenge<S: Store>(
    store: &S,
    user: UserId,
    friend: UserId,
    days: u32,
    force: bool,
    today: NaiveDate,
) -> Result<PairingOutcome, ChallengeError> {
    validate_length(days)?;
    if user == friend {
        return Err(ChallengeError::validation("cannot pair with yourself"));
    }
    require_friend(store, user, friend).await?;

    let mut conflicts = store.active_challenge_pairs(user).await?;
    for row in store.active_challenge_pairs(friend).await? {
        if !conflicts.iter().any(|existing| existing.id == row.id) {
            conflicts.push(row);
        }
    }
    if !conflicts.is_empty() && !force {
        info!(%user, %friend, conflicts = conflicts.len(), "paired challenge needs confirmation");
        return Ok(PairingOutcome::NeedsConfirmation { conflicts });
    }

    let mut cleared: BTreeSet<(UserId, UserId)> = BTreeSet::new();
    cleared.insert(ordered(user, friend));
    store.deactivate_challenge_pair(user, friend).await?;
    for row in &conflicts {
        if cleared.insert(ordered(row.user_id, row.friend_id)) {
            store.deactivate_challenge_pair(row.user_id, row.friend_id).await?;
        }
    }

    let pairing = FriendChallenge {
        id: Uuid::new_v4(),
        user_id: user,
        friend_id: friend,
        started_at: today,
        length_days: days,
        active: true,
    };
    store.insert_challenge_pair(pairing.clone()).await?;
    store
        .insert_challenge_pair(FriendChallenge {
            id: Uuid::new_v4(),
            user_id: friend,
            friend_id: user,
            ..pairing.clone()
        })
        .await?;

    for member in [user, friend] {
        let run_id = Uuid::new_v4();
        let state = ChallengeState {
            run_id: Some(run_id),
            ..ChallengeState::started(today, days)
        };
        store.update_profile(member, ProfileUpdate::challenge(state)).await?;
        store.log_challenge_start(member, run_id, today, days).await?;
    }
    info!(%user, %friend, days, forced = force, "paired challenge started");
    Ok(PairingOutcome::Started { pairing })
}

fn ordered(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Removes both edges and every pairing row between the two users. When
/// the pair had an active challenge both users' challenges stop.
pub async fn unfriend<S: Store>(store: &S, user: UserId, friend: UserId) -> Result<(), ChallengeError> {
    let was_paired = store
        .active_challenge_pairs(user)
        .await?
        .iter()
        .any(|row| row.links(user, friend));

    let edges = store.delete_friend_edges(user, friend).await?;
    let pairs = store.delete_challenge_pairs(user, friend).await?;

    if was_paired {
        for member in [user, friend] {
            match store.get_profile(member).await? {
                Some(profile) => {
                    let state = ChallengeState::inactive(profile.challenge.length_days);
                    store.update_profile(member, ProfileUpdate::challenge(state)).await?;
                }
                None => warn!(%member, "profile missing while clearing paired challenge"),
            }
        }
    }
    info!(%user, %friend, edges, pairs, was_paired, "friendship removed");
    Ok(())
}

pub async fn create_invite<S: Store>(
    store: &S,
    inviter: UserId,
    req: InviteRequest,
    now: DateTime<Utc>,
) -> Result<Invite, ChallengeError> {
    req.validate()?;
    let email = normalize_email(&req.email);
    load_profile(store, inviter).await?;
    let invite = Invite {
        id: Uuid::new_v4(),
        inviter_id: inviter,
        email,
        used: false,
        used_at: None,
        created_at: now,
    };
    store.insert_invite(invite.clone()).await?;
    info!(%inviter, "invite created");
    Ok(invite)
}

/// Links invitee and inviter as friends and consumes matching invites.
/// The inviter must have invited the invitee's email. Returns how many
/// invites were consumed; repeat calls return 0.
pub async fn finalize_invite<S: Store>(
    store: &S,
    inviter: UserId,
    invitee: UserId,
    now: DateTime<Utc>,
) -> Result<usize, ChallengeError> {
    if inviter == invitee {
        return Err(ChallengeError::validation("cannot accept your own invite"));
    }
    let invitee_profile = load_profile(store, invitee).await?;
    load_profile(store, inviter).await?;
    if !store.has_invite(inviter, &invitee_profile.email).await? {
        warn!(%inviter, %invitee, "invite acceptance without a matching invite");
        return Err(ChallengeError::NotFound("invite".to_string()));
    }

    ensure_friendship(store, inviter, invitee).await?;
    let used = store
        .mark_invites_used(inviter, &invitee_profile.email, now)
        .await?;
    info!(%inviter, %invitee, used, "invite finalized");
    Ok(used)
}

/// Progress of both friends inside their shared window. An explicit pairing
/// defines the window; otherwise it is derived from both running challenges.
pub async fn buddy_progress<S: Store>(
    store: &S,
    user: UserId,
    friend: UserId,
    today: NaiveDate,
) -> Result<BuddyProgress, ChallengeError> {
    require_friend(store, user, friend).await?;
    let mine = load_profile(store, user).await?;
    let theirs = load_profile(store, friend).await?;

    let explicit = store
        .active_challenge_pairs(user)
        .await?
        .into_iter()
        .find(|row| row.links(user, friend))
        .map(|row| PairWindow {
            start: row.started_at,
            length_days: row.length_days,
        });
    let window = explicit.or_else(|| pair_window(&mine.challenge, &theirs.challenge));

    let (my_progress, friend_progress) = match window {
        Some(window) => {
            let my_baths = store.fetch_bath_records(user).await?;
            let friend_dates = distinct_dates(&store.fetch_bath_records(friend).await?);
            (
                compute_my_progress_days(&my_baths, Some(window.start), today),
                compute_friend_progress(&friend_dates, window.start, true, today),
            )
        }
        None => (0, 0),
    };

    Ok(BuddyProgress {
        friend_id: friend,
        window,
        my_progress,
        friend_progress,
    })
}
