use crate::challenge::load_profile;
use crate::errors::ChallengeError;
use crate::models::{BathRecord, LogBathRequest, UserId};
use crate::stats::parse_duration;
use crate::storage::Store;
use crate::validation::normalize_optional;
use chrono::{NaiveDate, NaiveTime};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Validates and stores one bath. A repeated idempotency key returns the
/// stored record with `false`.
pub async fn log_bath<S: Store>(
    store: &S,
    user: UserId,
    today: NaiveDate,
    time_now: NaiveTime,
    req: LogBathRequest,
) -> Result<(BathRecord, bool), ChallengeError> {
    req.validate()?;
    let duration_seconds = parse_duration(&req.duration)?;
    let date = req.date.unwrap_or(today);
    if date > today {
        return Err(ChallengeError::validation("cannot log a bath in the future"));
    }

    load_profile(store, user).await?;

    let (record, inserted) = store
        .insert_bath_record(BathRecord {
            id: Uuid::new_v4(),
            user_id: user,
            date,
            time: req.time.unwrap_or(time_now),
            duration_seconds,
            feeling: req.feeling.trim().to_string(),
            proof_url: normalize_optional(req.proof_url.as_deref()),
            kind: req.kind,
            idempotency_key: format!("{user}:{}", req.idempotency_key.trim()),
        })
        .await?;
    if inserted {
        info!(%user, %date, duration_seconds, "bath logged");
    }
    Ok((record, inserted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BathType, CreateProfileRequest};
    use crate::profiles::create_profile;
    use crate::storage::JsonStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    fn request(key: &str, duration: &str) -> LogBathRequest {
        LogBathRequest {
            idempotency_key: key.to_string(),
            date: None,
            time: None,
            duration: duration.to_string(),
            feeling: "🥶".to_string(),
            proof_url: None,
            kind: BathType::Tub,
        }
    }

    async fn setup() -> (JsonStore, UserId) {
        let store = JsonStore::in_memory();
        let user = Uuid::new_v4();
        create_profile(
            &store,
            user,
            CreateProfileRequest {
                display_name: "Ice".to_string(),
                email: "ice@example.com".to_string(),
                phone: None,
            },
        )
        .await
        .unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn retried_submission_is_stored_once() {
        let (store, user) = setup().await;
        let (first, inserted) = log_bath(&store, user, today(), noon(), request("open-1", "3:10"))
            .await
            .unwrap();
        assert!(inserted);
        assert_eq!(first.duration_seconds, 190);
        assert_eq!(first.date, today());
        assert_eq!(first.time, noon());

        let (second, inserted) = log_bath(&store, user, today(), noon(), request("open-1", "3:10"))
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(second.id, first.id);
        assert_eq!(store.fetch_bath_records(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn keys_are_scoped_per_user() {
        let (store, user) = setup().await;
        let other = Uuid::new_v4();
        create_profile(
            &store,
            other,
            CreateProfileRequest {
                display_name: "Other".to_string(),
                email: "other@example.com".to_string(),
                phone: None,
            },
        )
        .await
        .unwrap();

        log_bath(&store, user, today(), noon(), request("same", "1:00")).await.unwrap();
        let (_, inserted) = log_bath(&store, other, today(), noon(), request("same", "1:00"))
            .await
            .unwrap();
        assert!(inserted);
    }

    #[tokio::test]
    async fn rejects_invalid_input_before_storing() {
        let (store, user) = setup().await;
        let cases = [
            request("", "1:00"),
            request("k1", "1:75"),
            LogBathRequest {
                feeling: " ".to_string(),
                ..request("k2", "1:00")
            },
            LogBathRequest {
                proof_url: Some("ftp://x".to_string()),
                ..request("k3", "1:00")
            },
            LogBathRequest {
                date: Some(today().succ_opt().unwrap()),
                ..request("k4", "1:00")
            },
        ];
        for case in cases {
            let result = log_bath(&store, user, today(), noon(), case).await;
            assert!(matches!(result, Err(ChallengeError::Validation(_))));
        }
        assert!(store.fetch_bath_records(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = JsonStore::in_memory();
        let result = log_bath(&store, Uuid::new_v4(), today(), noon(), request("k", "1:00")).await;
        assert!(matches!(result, Err(ChallengeError::NotFound(_))));
    }
}
