//! Notification badge client for the SnapFlow web application.
//!
//! A [`NotificationClient`] keeps an unread counter in a page model in sync
//! with the server: it polls the unread-count endpoint, marks or deletes
//! notifications, listens on an optional push channel and raises native
//! desktop notifications when the count grows.

use std::fmt;
use std::str::FromStr;

/// Application directory resolution.
pub mod app_dirs;
/// Unread-count, mark-read and delete endpoints.
pub mod api;
/// Badge rendering policy.
pub mod badge;
/// The notification client and its event loop.
pub mod client;
/// TOML configuration.
pub mod config;
/// Session cookie and CSRF token storage.
pub mod credentials;
/// Anti-forgery token providers.
pub mod csrf;
/// In-memory page model.
pub mod dom;
/// Events consumed by the client loop.
pub mod events;
pub(crate) mod http_client;
/// Tracing setup.
pub mod logging;
/// Native notification popups and permission state.
pub mod notifier;
/// Notification page layout helpers.
pub mod page;
/// Recurring poll timer.
pub mod poller;
/// Optional push channel.
pub mod push;

pub use client::NotificationClient;
pub use config::ClientConfig;
pub use events::{ClientEvent, Command, Visibility};

/// Server-side identifier of one notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(pub u64);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NotificationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}
