mod support;

use support::env::ConfigHomeGuard;

use snapflow_notify::app_dirs::APP_DIR_NAME;
use snapflow_notify::config::{self, ClientConfig};
use snapflow_notify::credentials::{CredentialStore, SessionCredentials};
use snapflow_notify::notifier::{Permission, PermissionStore};

#[test]
fn config_lives_in_app_dir_and_defaults_when_absent() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let _env = ConfigHomeGuard::set(temp.path().to_path_buf());

    let path = config::config_path().expect("config path");
    assert_eq!(path, temp.path().join(APP_DIR_NAME).join("config.toml"));
    assert_eq!(config::load_or_default().unwrap(), ClientConfig::default());

    let custom = ClientConfig {
        server_url: "https://snap.example/".to_string(),
        push_url: Some("/notifications/stream/".to_string()),
        ..ClientConfig::default()
    };
    config::save_to_path(&custom, &path).unwrap();
    assert_eq!(config::load_or_default().unwrap(), custom);
}

#[test]
fn session_round_trips_through_file_fallback() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let _env = ConfigHomeGuard::set(temp.path().to_path_buf());

    let store = CredentialStore::new().expect("credential store");
    assert_eq!(store.get().unwrap(), None);
    let session = SessionCredentials {
        session_id: "abc".to_string(),
        csrf_token: "tok".to_string(),
    };
    store.set(&session).unwrap();
    assert_eq!(store.get().unwrap(), Some(session.clone()));
    assert_eq!(session.cookie_header("csrftoken"), "sessionid=abc; csrftoken=tok");

    store.delete().unwrap();
    assert_eq!(store.get().unwrap(), None);
}

#[test]
fn permission_store_persists_in_app_dir() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let _env = ConfigHomeGuard::set(temp.path().to_path_buf());

    let store = PermissionStore::in_app_dir().expect("permission store");
    assert!(store.path().starts_with(temp.path()));
    assert_eq!(store.load(), Permission::Default);
    store.save(Permission::Granted).unwrap();
    assert_eq!(PermissionStore::in_app_dir().unwrap().load(), Permission::Granted);
}
