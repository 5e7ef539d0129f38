use crate::errors::ChallengeError;
use crate::models::{
    ChallengeState, CreateProfileRequest, Profile, ProfileUpdate, UpdateProfileRequest, UserId,
};
use crate::storage::Store;
use crate::validation::{normalize_email, normalize_optional};
use chrono::Utc;
use tracing::info;
use validator::Validate;

/// Creates the caller's profile with a default challenge. Existing profiles are returned as is.
pub async fn create_profile<S: Store>(
    store: &S,
    user: UserId,
    req: CreateProfileRequest,
) -> Result<Profile, ChallengeError> {
    req.validate()?;

    let profile = store
        .insert_profile(Profile {
            user_id: user,
            display_name: req.display_name.trim().to_string(),
            email: normalize_email(&req.email),
            phone: normalize_optional(req.phone.as_deref()),
            challenge: ChallengeState::default(),
            created_at: Utc::now(),
        })
        .await?;
    info!(%user, "profile ready");
    Ok(profile)
}

pub async fn update_profile<S: Store>(
    store: &S,
    user: UserId,
    req: UpdateProfileRequest,
) -> Result<Profile, ChallengeError> {
    req.validate()?;

    let update = ProfileUpdate {
        display_name: req.display_name.map(|name| name.trim().to_string()),
        phone: req
            .phone
            .as_deref()
            .map(|phone| normalize_optional(Some(phone))),
        challenge: None,
    };
    Ok(store.update_profile(user, update).await?)
}
