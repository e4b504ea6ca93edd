//! The long-lived notification client.
//!
//! One [`NotificationClient`] owns the cached unread count, the page model and
//! the timer/push handles. It runs on a single thread and reacts to
//! [`ClientEvent`]s; helper threads only send events.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::mpsc::{Receiver, Sender};

use tracing::{debug, info, warn};

use crate::api::NotificationApi;
use crate::badge::{self, BadgeState, BadgeTargets};
use crate::config::ClientConfig;
use crate::dom::{Document, NodeId};
use crate::events::{ClientEvent, Command, Visibility};
use crate::notifier::{self, NativeNotification, NativeNotifier, Permission};
use crate::page::{self, ControlRole};
use crate::poller::PollHandle;
use crate::push::{PushConnector, PushEnvelope, PushHandle};
use crate::NotificationId;

pub struct NotificationClient<A, N> {
    config: ClientConfig,
    api: A,
    notifier: N,
    page: Document,
    unread_count: u64,
    bound: HashMap<NodeId, ControlRole>,
    poll: Option<PollHandle>,
    push: Option<PushHandle>,
    push_connector: Option<Box<dyn PushConnector>>,
    events: Sender<ClientEvent>,
}

impl<A: NotificationApi, N: NativeNotifier> NotificationClient<A, N> {
    /// Create an idle client; nothing runs until [`Self::initialize`].
    pub fn new(
        config: ClientConfig,
        api: A,
        notifier: N,
        page: Document,
        events: Sender<ClientEvent>,
    ) -> Self {
        Self {
            config,
            api,
            notifier,
            page,
            unread_count: 0,
            bound: HashMap::new(),
            poll: None,
            push: None,
            push_connector: None,
            events,
        }
    }

    /// Connector used when a push channel URL is known at start-up.
    pub fn with_push_connector(mut self, connector: Box<dyn PushConnector>) -> Self {
        self.push_connector = Some(connector);
        self
    }

    /// Read the initial count, start polling, bind controls, open the push
    /// channel and ask for notification permission when still undecided.
    pub fn initialize(&mut self) {
        self.unread_count = page::read_initial_count(&self.page, &self.config.count_selector);
        self.render_badge();
        self.start_polling();
        self.bind_controls();
        self.open_push_channel();
        if self.notifier.permission() == Permission::Default {
            let answer = self.notifier.request_permission();
            info!("Notification permission: {answer:?}");
        }
        info!(
            "Notification client ready with {} unread, polling every {} ms",
            self.unread_count, self.config.check_interval_ms
        );
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn page(&self) -> &Document {
        &self.page
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Badge state as rendered in the page, if the badge exists.
    pub fn badge_state(&self) -> Option<BadgeState> {
        badge::observed_state(&self.page, self.badge_targets()).ok()
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    pub fn push_url(&self) -> Option<&str> {
        self.push.as_ref().map(PushHandle::url)
    }

    pub fn start_polling(&mut self) {
        if self.poll.is_none() {
            self.poll = Some(PollHandle::start(
                self.config.check_interval(),
                self.events.clone(),
            ));
        }
    }

    pub fn stop_polling(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.stop();
            debug!("Polling stopped");
        }
    }

    /// Reconcile the cached count with the server.
    pub fn poll_tick(&mut self) {
        let count = match self.api.unread_count() {
            Ok(count) => count,
            Err(err) => {
                warn!("Failed to check notifications: {err}");
                return;
            }
        };
        if count == self.unread_count {
            return;
        }
        if count > self.unread_count {
            let delta = count - self.unread_count;
            let popup = NativeNotification {
                title: self.config.notification_title.clone(),
                body: notifier::new_notifications_text(delta),
                icon: self.config.notification_icon.clone(),
                click_url: Some(self.absolute(&self.config.list_url)),
            };
            notifier::offer(&mut self.notifier, &popup);
        }
        self.set_count(count);
    }

    pub fn on_visibility_change(&mut self, visibility: Visibility) {
        if visibility == Visibility::Visible {
            self.poll_tick();
        }
    }

    /// Dispatch a click on a page element bound during initialization.
    pub fn click(&mut self, node: NodeId) {
        let Some(role) = self.bound.get(&node).copied() else {
            debug!("Ignoring click on unbound element {node:?}");
            return;
        };
        if !self.page.is_connected(node) {
            debug!("Ignoring click on detached control {node:?}");
            return;
        }
        let Some(id) = page::notification_id_of(&self.page, node) else {
            warn!("Clicked control has no notification id");
            return;
        };
        match role {
            ControlRole::MarkRead => self.mark_read(id),
            ControlRole::Delete => self.delete_notification(id),
        }
    }

    pub fn mark_read(&mut self, id: NotificationId) {
        let outcome = match self.api.mark_read(id) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("Failed to mark notification {id} as read: {err}");
                return;
            }
        };
        self.set_count(outcome.unread_count);
        if let Err(err) = page::mark_item_read(&mut self.page, id) {
            debug!("Notification {id} not restyled: {err}");
        }
    }

    /// Delete on the server, drop the item, then refresh the count once.
    pub fn delete_notification(&mut self, id: NotificationId) {
        if let Err(err) = self.api.delete(id) {
            warn!("Failed to delete notification {id}: {err}");
            return;
        }
        if let Err(err) = page::remove_item(&mut self.page, id) {
            debug!("Notification {id} not removed from page: {err}");
        }
        let page = &self.page;
        self.bound.retain(|node, _| page.is_connected(*node));
        self.poll_tick();
    }

    pub fn mark_all_read(&mut self) {
        if let Err(err) = self.api.mark_all_read() {
            warn!("Failed to mark all notifications as read: {err}");
            return;
        }
        match page::mark_all_items_read(&mut self.page) {
            Ok(restyled) => debug!("Restyled {restyled} notifications as read"),
            Err(err) => warn!("{err}"),
        }
        self.poll_tick();
    }

    /// React to one raw push-channel message.
    pub fn handle_push_message(&mut self, text: &str) {
        let envelope = match PushEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("{err}");
                return;
            }
        };
        if !envelope.is_notification() {
            debug!("Ignoring push message of type '{}'", envelope.kind);
            return;
        }
        self.poll_tick();
        let Some(pushed) = envelope.notification else {
            return;
        };
        if self.notifier.permission() != Permission::Granted {
            return;
        }
        let popup = NativeNotification {
            title: pushed.title,
            body: pushed.message,
            icon: self.config.notification_icon.clone(),
            click_url: pushed.action_url.map(|url| self.absolute(&url)),
        };
        if let Err(err) = self.notifier.show(&popup) {
            warn!("Failed to show native notification: {err}");
        }
    }

    /// Apply one event; `Break` ends the loop.
    pub fn handle(&mut self, event: ClientEvent) -> ControlFlow<()> {
        match event {
            ClientEvent::PollTick => self.poll_tick(),
            ClientEvent::VisibilityChanged(visibility) => self.on_visibility_change(visibility),
            ClientEvent::Click(node) => self.click(node),
            ClientEvent::PushOpened => debug!("Push channel connected"),
            ClientEvent::PushMessage(text) => self.handle_push_message(&text),
            ClientEvent::PushClosed => debug!("Push channel closed"),
            ClientEvent::Command(command) => return self.run_command(command),
            ClientEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Process events until a `Shutdown` event or a quit command.
    ///
    /// The client keeps a sender of its own for timer and push events, so
    /// the channel stays open while it runs.
    ///
    /// `after_event` sees the client after each applied event.
    pub fn run(&mut self, events: &Receiver<ClientEvent>, mut after_event: impl FnMut(&Self)) {
        while let Ok(event) = events.recv() {
            let flow = self.handle(event);
            after_event(&*self);
            if flow.is_break() {
                break;
            }
        }
        self.shutdown();
    }

    pub fn shutdown(&mut self) {
        self.stop_polling();
        if let Some(push) = self.push.take() {
            debug!("Closing push listener for {}", push.url());
        }
    }

    fn run_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::MarkRead(id) => self.mark_read(id),
            Command::Delete(id) => self.delete_notification(id),
            Command::MarkAllRead => self.mark_all_read(),
            Command::Refresh => self.poll_tick(),
            Command::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn set_count(&mut self, count: u64) {
        self.unread_count = count;
        self.render_badge();
    }

    fn render_badge(&mut self) {
        let targets = BadgeTargets {
            container: &self.config.menu_selector,
            counter: &self.config.count_selector,
        };
        if let Err(err) = badge::render(&mut self.page, targets, self.unread_count) {
            warn!("Badge not updated: {err}");
        }
    }

    fn badge_targets(&self) -> BadgeTargets<'_> {
        BadgeTargets {
            container: &self.config.menu_selector,
            counter: &self.config.count_selector,
        }
    }

    fn bind_controls(&mut self) {
        for role in [ControlRole::MarkRead, ControlRole::Delete] {
            match self.page.query_selector_all(&role.selector()) {
                Ok(nodes) => self.bound.extend(nodes.into_iter().map(|node| (node, role))),
                Err(err) => warn!("{err}"),
            }
        }
        debug!("Bound {} notification controls", self.bound.len());
    }

    fn open_push_channel(&mut self) {
        let Some(url) = page::push_channel_url(&self.page).or_else(|| self.config.push_url.clone())
        else {
            return;
        };
        let url = match self.config.resolve(&url) {
            Ok(url) => url.to_string(),
            Err(err) => {
                warn!("Push channel disabled: {err}");
                return;
            }
        };
        let Some(connector) = self.push_connector.take() else {
            debug!("No push connector for {url}");
            return;
        };
        self.push = Some(PushHandle::spawn(
            url,
            connector,
            self.config.push_reconnect_delay(),
            self.events.clone(),
        ));
    }

    fn absolute(&self, path: &str) -> String {
        match self.config.resolve(path) {
            Ok(url) => url.to_string(),
            Err(err) => {
                debug!("{err}");
                path.to_string()
            }
        }
    }
}
