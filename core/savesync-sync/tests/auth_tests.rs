use savesync_storage::{keys, MetaStore, SqliteStore};
use savesync_sync::{AccessToken, Credential, CredentialProvider, Identity};
use std::sync::Arc;

fn identity() -> Identity {
    Identity {
        id: 7,
        login: "player-one".to_string(),
        name: None,
        avatar_url: Some("https://avatars.example/7".to_string()),
    }
}

// ── Credential ───────────────────────────────────────────────────

#[test]
fn anonymous_credential_is_not_authenticated() {
    let credential = Credential::anonymous();
    assert!(!credential.is_authenticated());
    assert!(credential.identity().is_none());
    assert!(credential.token().is_none());
}

#[test]
fn token_debug_is_redacted() {
    let token = AccessToken::new("ghp_secret");
    assert_eq!(format!("{token:?}"), "AccessToken(***)");
    assert_eq!(token.expose(), "ghp_secret");

    let credential = Credential::authenticated(identity(), token);
    assert!(!format!("{credential:?}").contains("ghp_secret"));
}

// ── CredentialProvider ───────────────────────────────────────────

#[test]
fn sign_in_and_out_in_memory() {
    let provider = CredentialProvider::new();
    assert!(!provider.is_authenticated());

    provider
        .sign_in(identity(), AccessToken::new("t1"))
        .unwrap();
    assert!(provider.is_authenticated());
    assert_eq!(provider.token().unwrap().expose(), "t1");
    assert_eq!(provider.current().identity().unwrap().login, "player-one");

    provider.sign_out().unwrap();
    assert!(!provider.is_authenticated());
    assert!(provider.token().is_none());
}

#[tokio::test]
async fn subscribers_observe_changes() {
    let provider = CredentialProvider::new();
    let mut rx = provider.subscribe();
    assert!(!rx.borrow_and_update().is_authenticated());

    provider
        .sign_in(identity(), AccessToken::new("t1"))
        .unwrap();
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().is_authenticated());

    provider.sign_out().unwrap();
    rx.changed().await.unwrap();
    assert!(!rx.borrow_and_update().is_authenticated());
}

#[test]
fn credential_survives_restart() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    let provider = CredentialProvider::restore(store.clone());
    assert!(!provider.is_authenticated());
    provider
        .sign_in(identity(), AccessToken::new("persisted"))
        .unwrap();
    assert!(store.get(keys::CREDENTIAL).unwrap().is_some());

    let restored = CredentialProvider::restore(store.clone());
    assert!(restored.is_authenticated());
    assert_eq!(restored.token().unwrap().expose(), "persisted");
    assert_eq!(restored.current().identity(), Some(&identity()));
}

#[test]
fn sign_out_removes_stored_credential() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = CredentialProvider::restore(store.clone());
    provider
        .sign_in(identity(), AccessToken::new("t"))
        .unwrap();

    provider.sign_out().unwrap();

    assert!(store.get(keys::CREDENTIAL).unwrap().is_none());
    assert!(!CredentialProvider::restore(store).is_authenticated());
}

#[test]
fn unreadable_stored_credential_is_discarded() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set(keys::CREDENTIAL, "{not json").unwrap();

    let provider = CredentialProvider::restore(store.clone());

    assert!(!provider.is_authenticated());
    assert!(store.get(keys::CREDENTIAL).unwrap().is_none());
}
