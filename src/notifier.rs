//! Native notification popups gated by a three-state permission.

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app_dirs;

const PERMISSION_FILE_NAME: &str = "permission.toml";

/// Whether native notifications may be shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    /// Never asked; the next emission prompts.
    #[default]
    Default,
    /// Refused; never emit and never prompt again.
    Denied,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification backend failed: {0}")]
    Backend(String),
    #[error("Failed to persist permission at {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Popup content plus the URL opened when the popup is activated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub click_url: Option<String>,
}

/// Body text announcing `delta` new notifications.
pub fn new_notifications_text(delta: u64) -> String {
    if delta == 1 {
        "You have 1 new notification".to_string()
    } else {
        format!("You have {delta} new notifications")
    }
}

/// OS-level notification capability.
pub trait NativeNotifier {
    fn permission(&self) -> Permission;
    /// Ask for permission and return the resulting state.
    fn request_permission(&mut self) -> Permission;
    fn show(&mut self, notification: &NativeNotification) -> Result<(), NotifyError>;
}

/// Show `notification` according to the permission state.
///
/// Granted emits, default asks first and emits only when granted, denied does
/// nothing. Returns whether an emission was attempted.
pub fn offer<N: NativeNotifier + ?Sized>(notifier: &mut N, notification: &NativeNotification) -> bool {
    let permission = match notifier.permission() {
        Permission::Default => notifier.request_permission(),
        other => other,
    };
    if permission != Permission::Granted {
        debug!("Native notification suppressed ({permission:?})");
        return false;
    }
    if let Err(err) = notifier.show(notification) {
        warn!("Failed to show native notification: {err}");
    }
    true
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PermissionRecord {
    #[serde(default)]
    permission: Permission,
}

/// Permission decision persisted in the app directory.
#[derive(Clone, Debug)]
pub struct PermissionStore {
    path: PathBuf,
}

impl PermissionStore {
    pub fn in_app_dir() -> Result<Self, app_dirs::AppDirError> {
        Ok(Self::at(app_dirs::app_root_dir()?.join(PERMISSION_FILE_NAME)))
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored permission; unreadable or missing state counts as never asked.
    pub fn load(&self) -> Permission {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| toml::from_str::<PermissionRecord>(&text).ok())
            .map(|record| record.permission)
            .unwrap_or_default()
    }

    pub fn save(&self, permission: Permission) -> Result<(), NotifyError> {
        let persist = |source| NotifyError::Persist {
            path: self.path.clone(),
            source,
        };
        let text = toml::to_string(&PermissionRecord { permission })
            .map_err(|err| persist(std::io::Error::other(err)))?;
        std::fs::write(&self.path, text).map_err(persist)
    }
}

/// Answers a permission request.
pub trait PermissionPrompt {
    fn ask(&mut self) -> Permission;
}

/// Asks on the controlling terminal.
///
/// Without an interactive stdin nobody can answer, so the state stays
/// [`Permission::Default`] and the next interactive run asks again.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl PermissionPrompt for TerminalPrompt {
    fn ask(&mut self) -> Permission {
        let stdin = std::io::stdin();
        let interactive = stdin.is_terminal();
        read_answer(interactive, &mut stdin.lock())
    }
}

fn read_answer(interactive: bool, input: &mut impl BufRead) -> Permission {
    if !interactive {
        debug!("No terminal to ask for notification permission");
        return Permission::Default;
    }
    eprint!("Allow desktop notifications for new activity? [y/N] ");
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(0) | Err(_) => Permission::Default,
        Ok(_) => parse_answer(&answer),
    }
}

fn parse_answer(answer: &str) -> Permission {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Permission::Granted,
        _ => Permission::Denied,
    }
}

/// Desktop popups through `notify-rust`.
pub struct DesktopNotifier<P> {
    app_name: String,
    permission: Permission,
    store: PermissionStore,
    prompt: P,
}

impl<P: PermissionPrompt> DesktopNotifier<P> {
    pub fn new(app_name: impl Into<String>, store: PermissionStore, prompt: P) -> Self {
        let permission = store.load();
        Self {
            app_name: app_name.into(),
            permission,
            store,
            prompt,
        }
    }
}

impl<P: PermissionPrompt> NativeNotifier for DesktopNotifier<P> {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&mut self) -> Permission {
        if self.permission != Permission::Default {
            return self.permission;
        }
        let answer = self.prompt.ask();
        if answer != Permission::Default {
            if let Err(err) = self.store.save(answer) {
                warn!("{err}");
            }
        }
        self.permission = answer;
        answer
    }

    fn show(&mut self, notification: &NativeNotification) -> Result<(), NotifyError> {
        let mut popup = notify_rust::Notification::new();
        popup
            .appname(&self.app_name)
            .summary(&notification.title)
            .body(&notification.body)
            .icon(&notification.icon);
        if notification.click_url.is_some() {
            popup.action("default", "Open");
        }
        show_popup(&popup, notification.click_url.clone())
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn show_popup(popup: &notify_rust::Notification, click_url: Option<String>) -> Result<(), NotifyError> {
    let Some(url) = click_url else {
        return popup
            .show()
            .map(|_| ())
            .map_err(|err| NotifyError::Backend(err.to_string()));
    };
    // Waiting for activation blocks until the popup is clicked or dismissed.
    let popup = popup.clone();
    std::thread::Builder::new()
        .name("notification-popup".to_string())
        .spawn(move || match popup.show() {
            Ok(handle) => handle.wait_for_action(|action| {
                if action == "default" {
                    open_in_browser(&url);
                }
            }),
            Err(err) => warn!("Failed to show native notification: {err}"),
        })
        .map(|_| ())
        .map_err(|err| NotifyError::Backend(format!("Failed to start popup thread: {err}")))
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn show_popup(popup: &notify_rust::Notification, click_url: Option<String>) -> Result<(), NotifyError> {
    if let Some(url) = click_url {
        debug!("Popup activation is not tracked on this platform; link was {url}");
    }
    popup
        .show()
        .map(|_| ())
        .map_err(|err| NotifyError::Backend(err.to_string()))
}

/// Best-effort open `url` in a new browser context.
pub fn open_in_browser(url: &str) {
    if let Err(err) = open::that(url) {
        warn!("Failed to open {url}: {err}");
    }
}
