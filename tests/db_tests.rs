// tests for user, session, and progress storage

use chrono::NaiveDate;
use stillmind::{Db, Error};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// every test gets its own shared-cache in-memory database
async fn test_db(name: &str) -> Db {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    Db::connect(&url).await.unwrap()
}

#[tokio::test]
async fn test_register_creates_user_with_zero_progress() {
    let db = test_db("memdb_register").await;

    let (user, created) = db
        .register_user(Some("u1".into()), Some("u1@example.com".into()))
        .await
        .unwrap();
    assert!(created);
    assert_eq!(user.id, "u1");
    assert_eq!(user.email.as_deref(), Some("u1@example.com"));
    assert!(!user.is_premium);

    let progress = db.get_progress("u1").await.unwrap();
    assert_eq!(progress.total_minutes, 0);
    assert_eq!(progress.current_streak, 0);
    assert_eq!(progress.sessions_completed, 0);
}

#[tokio::test]
async fn test_register_is_idempotent() {
    let db = test_db("memdb_idempotent").await;

    let (first, created) = db
        .register_user(Some("u1".into()), Some("u1@example.com".into()))
        .await
        .unwrap();
    assert!(created);

    let (second, created) = db
        .register_user(Some("u1".into()), Some("other@example.com".into()))
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(second.id, first.id);
    // the stored record is untouched
    assert_eq!(second.email.as_deref(), Some("u1@example.com"));
}

#[tokio::test]
async fn test_register_generates_id_when_missing() {
    let db = test_db("memdb_genid").await;

    let (user, created) = db.register_user(None, None).await.unwrap();
    assert!(created);
    assert!(!user.id.is_empty());

    // a blank id counts as missing
    let (other, created) = db.register_user(Some("  ".into()), None).await.unwrap();
    assert!(created);
    assert!(!other.id.is_empty());
    assert_ne!(other.id, user.id);
}

#[tokio::test]
async fn test_record_session_updates_aggregate() {
    let db = test_db("memdb_record").await;
    db.register_user(Some("u1".into()), None).await.unwrap();

    let session_id = db
        .record_session("u1", "breath-101", 300, date(2025, 3, 10))
        .await
        .unwrap();
    assert!(session_id > 0);

    let p = db.get_progress("u1").await.unwrap();
    assert_eq!(p.total_minutes, 5);
    assert_eq!(p.current_streak, 1);
    assert_eq!(p.longest_streak, 1);
    assert_eq!(p.sessions_completed, 1);
    assert_eq!(p.last_session_date, Some(date(2025, 3, 10)));
}

#[tokio::test]
async fn test_streak_survives_and_resets_across_days() {
    let db = test_db("memdb_streak").await;
    db.register_user(Some("u1".into()), None).await.unwrap();

    db.record_session("u1", "m", 600, date(2025, 3, 10))
        .await
        .unwrap();
    db.record_session("u1", "m", 600, date(2025, 3, 11))
        .await
        .unwrap();
    db.record_session("u1", "m", 600, date(2025, 3, 12))
        .await
        .unwrap();

    let p = db.get_progress("u1").await.unwrap();
    assert_eq!(p.current_streak, 3);
    assert_eq!(p.longest_streak, 3);

    // three day gap
    db.record_session("u1", "m", 600, date(2025, 3, 16))
        .await
        .unwrap();

    let p = db.get_progress("u1").await.unwrap();
    assert_eq!(p.current_streak, 1);
    assert_eq!(p.longest_streak, 3);
    assert_eq!(p.total_minutes, 40);
    assert_eq!(p.sessions_completed, 4);
}

#[tokio::test]
async fn test_session_rows_match_aggregate() {
    let db = test_db("memdb_atomic").await;
    db.register_user(Some("u1".into()), None).await.unwrap();

    for _ in 0..3 {
        db.record_session("u1", "m", 60, date(2025, 3, 10))
            .await
            .unwrap();
    }

    let sessions = db.recent_sessions("u1", 10).await.unwrap();
    let p = db.get_progress("u1").await.unwrap();
    assert_eq!(sessions.len(), 3);
    assert_eq!(p.sessions_completed, 3);
}

#[tokio::test]
async fn test_record_session_validates_input() {
    let db = test_db("memdb_validate").await;
    db.register_user(Some("u1".into()), None).await.unwrap();

    let err = db
        .record_session("", "m", 60, date(2025, 3, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = db
        .record_session("u1", "", 60, date(2025, 3, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = db
        .record_session("u1", "m", -5, date(2025, 3, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // nothing was written along the way
    let p = db.get_progress("u1").await.unwrap();
    assert_eq!(p.sessions_completed, 0);
}

#[tokio::test]
async fn test_record_session_requires_registered_user() {
    let db = test_db("memdb_fk").await;

    let result = db.record_session("nobody", "m", 60, date(2025, 3, 10)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_unknown_user_reads_zero_progress() {
    let db = test_db("memdb_zero").await;

    let p = db.get_progress("ghost").await.unwrap();
    assert_eq!(p.total_minutes, 0);
    assert_eq!(p.current_streak, 0);
    assert_eq!(p.longest_streak, 0);
    assert_eq!(p.sessions_completed, 0);
    assert_eq!(p.last_session_date, None);
}

#[tokio::test]
async fn test_recent_sessions_newest_first_and_capped() {
    let db = test_db("memdb_recent").await;
    db.register_user(Some("u1".into()), None).await.unwrap();

    for i in 0..12 {
        db.record_session("u1", &format!("m{i}"), 60, date(2025, 3, 10))
            .await
            .unwrap();
    }

    let sessions = db.recent_sessions("u1", 10).await.unwrap();
    assert_eq!(sessions.len(), 10);
    assert_eq!(sessions[0].meditation_id, "m11");
    assert_eq!(sessions[9].meditation_id, "m2");
}
