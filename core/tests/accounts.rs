//! Registration, login, tokens and admin promotion through the service layer.

use acled_core::{
    auth::TokenIssuer,
    clock::FixedClock,
    config::AppConfig,
    error::AcledError,
    service::{ConflictService, Credentials},
    store::Store,
};
use chrono::Utc;

fn store() -> Store {
    let store = Store::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn creds(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.into(),
        password: password.into(),
    }
}

#[test]
fn register_then_login() {
    let store = store();
    let config = AppConfig::default_test();
    let clock = FixedClock(Utc::now());
    let service = ConflictService::new(&store, &config, &clock);

    let profile = service.register(&creds("alice", "secret#123")).unwrap();
    assert_eq!(profile.username, "alice");
    assert!(!profile.is_admin);

    let stored = store.user_by_username("alice").unwrap().unwrap();
    assert_ne!(stored.password_hash, "secret#123", "password must be hashed");

    let token = service.login(&creds("alice", "secret#123")).unwrap();
    let principal = TokenIssuer::new(&config.auth).verify(&token.access_token).unwrap();
    assert_eq!(principal.user_id, profile.id);
    assert!(!principal.is_admin);
}

#[test]
fn duplicate_username_is_a_conflict() {
    let store = store();
    let config = AppConfig::default_test();
    let clock = FixedClock(Utc::now());
    let service = ConflictService::new(&store, &config, &clock);

    service.register(&creds("alice", "secret#123")).unwrap();
    let err = service.register(&creds("alice", "other#pass")).unwrap_err();
    assert!(matches!(err, AcledError::Conflict { .. }), "got {err:?}");
}

#[test]
fn weak_credentials_are_rejected() {
    let store = store();
    let config = AppConfig::default_test();
    let clock = FixedClock(Utc::now());
    let service = ConflictService::new(&store, &config, &clock);

    for (user, pass) in [("al", "secret#123"), ("alice!", "secret#123"), ("alice", "nohashpassword"), ("alice", "s#1")] {
        let err = service.register(&creds(user, pass)).unwrap_err();
        assert!(matches!(err, AcledError::Validation(_)), "{user}/{pass}: got {err:?}");
    }
    assert!(store.user_by_username("alice").unwrap().is_none());
}

#[test]
fn bad_login_is_unauthorized() {
    let store = store();
    let config = AppConfig::default_test();
    let clock = FixedClock(Utc::now());
    let service = ConflictService::new(&store, &config, &clock);
    service.register(&creds("alice", "secret#123")).unwrap();

    assert!(matches!(service.login(&creds("alice", "wrong#pass")), Err(AcledError::Unauthorized)));
    assert!(matches!(service.login(&creds("nobody", "secret#123")), Err(AcledError::Unauthorized)));
}

#[test]
fn promoted_admin_gets_admin_tokens() {
    let store = store();
    let config = AppConfig::default_test();
    let clock = FixedClock(Utc::now());
    let service = ConflictService::new(&store, &config, &clock);
    service.register(&creds("root", "secret#123")).unwrap();

    service.promote_admin("root").unwrap();
    let token = service.login(&creds("root", "secret#123")).unwrap();
    let header = format!("Bearer {}", token.access_token);
    let principal = service.authenticate(Some(&header)).unwrap();
    assert!(principal.is_admin);

    assert!(matches!(service.promote_admin("ghost"), Err(AcledError::NotFound { .. })));
    assert!(matches!(service.authenticate(None), Err(AcledError::Unauthorized)));
}
