use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

use snapflow_notify::api::{ApiError, MarkReadOutcome, NotificationApi};
use snapflow_notify::notifier::{NativeNotification, NativeNotifier, NotifyError, Permission};
use snapflow_notify::page::{PageItem, PageLayout, build_page};
use snapflow_notify::{ClientConfig, ClientEvent, NotificationClient, NotificationId};

/// Server double answering from queued responses. Unscripted calls fail.
#[derive(Default)]
pub struct ScriptedApi {
    counts: RefCell<VecDeque<Result<u64, ApiError>>>,
    mark_reads: RefCell<VecDeque<Result<MarkReadOutcome, ApiError>>>,
    deletes: RefCell<VecDeque<Result<(), ApiError>>>,
    mark_alls: RefCell<VecDeque<Result<(), ApiError>>>,
    pub count_calls: Cell<usize>,
    pub mark_read_calls: RefCell<Vec<NotificationId>>,
    pub delete_calls: RefCell<Vec<NotificationId>>,
}

impl ScriptedApi {
    pub fn count(&self, count: u64) -> &Self {
        self.counts.borrow_mut().push_back(Ok(count));
        self
    }

    pub fn count_fails(&self) -> &Self {
        self.counts
            .borrow_mut()
            .push_back(Err(ApiError::Transport("connection refused".to_string())));
        self
    }

    pub fn mark_read(&self, unread_count: u64) -> &Self {
        self.mark_reads
            .borrow_mut()
            .push_back(Ok(MarkReadOutcome { unread_count }));
        self
    }

    pub fn mark_read_fails(&self) -> &Self {
        self.mark_reads.borrow_mut().push_back(Err(ApiError::Rejected));
        self
    }

    pub fn delete(&self) -> &Self {
        self.deletes.borrow_mut().push_back(Ok(()));
        self
    }

    pub fn delete_fails(&self) -> &Self {
        self.deletes.borrow_mut().push_back(Err(ApiError::Status {
            code: 500,
            body: "boom".to_string(),
        }));
        self
    }

    pub fn mark_all(&self) -> &Self {
        self.mark_alls.borrow_mut().push_back(Ok(()));
        self
    }
}

fn unscripted<T>() -> Result<T, ApiError> {
    Err(ApiError::Transport("unscripted call".to_string()))
}

impl NotificationApi for ScriptedApi {
    fn unread_count(&self) -> Result<u64, ApiError> {
        self.count_calls.set(self.count_calls.get() + 1);
        self.counts.borrow_mut().pop_front().unwrap_or_else(unscripted)
    }

    fn mark_read(&self, id: NotificationId) -> Result<MarkReadOutcome, ApiError> {
        self.mark_read_calls.borrow_mut().push(id);
        self.mark_reads.borrow_mut().pop_front().unwrap_or_else(unscripted)
    }

    fn delete(&self, id: NotificationId) -> Result<(), ApiError> {
        self.delete_calls.borrow_mut().push(id);
        self.deletes.borrow_mut().pop_front().unwrap_or_else(unscripted)
    }

    fn mark_all_read(&self) -> Result<(), ApiError> {
        self.mark_alls.borrow_mut().pop_front().unwrap_or_else(unscripted)
    }
}

/// Notifier double recording prompts and popups.
pub struct RecordingNotifier {
    pub permission: Permission,
    /// Answer given when asked while undecided.
    pub answer: Permission,
    pub requests: usize,
    pub shown: Vec<NativeNotification>,
}

impl RecordingNotifier {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            answer: Permission::Denied,
            requests: 0,
            shown: Vec::new(),
        }
    }

    pub fn answering(mut self, answer: Permission) -> Self {
        self.answer = answer;
        self
    }
}

impl NativeNotifier for RecordingNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&mut self) -> Permission {
        self.requests += 1;
        if self.permission == Permission::Default {
            self.permission = self.answer;
        }
        self.permission
    }

    fn show(&mut self, notification: &NativeNotification) -> Result<(), NotifyError> {
        self.shown.push(notification.clone());
        Ok(())
    }
}

pub type TestClient = NotificationClient<ScriptedApi, RecordingNotifier>;

pub struct Harness {
    pub client: TestClient,
    pub events: Sender<ClientEvent>,
    pub receiver: Receiver<ClientEvent>,
}

pub fn unread(id: u64) -> PageItem {
    PageItem {
        id: NotificationId(id),
        title: format!("Notification {id}"),
        unread: true,
    }
}

pub fn read(id: u64) -> PageItem {
    PageItem {
        id: NotificationId(id),
        title: format!("Notification {id}"),
        unread: false,
    }
}

/// Client over a generated page, initialized, with a timer too slow to fire
/// during a test.
pub fn harness(unread_count: u64, items: Vec<PageItem>, notifier: RecordingNotifier) -> Harness {
    let config = ClientConfig {
        check_interval_ms: 3_600_000,
        ..ClientConfig::default()
    };
    let page = build_page(
        &config,
        &PageLayout {
            unread_count,
            items,
            ..PageLayout::default()
        },
    )
    .expect("build page");
    let (events, receiver) = mpsc::channel();
    let mut client = NotificationClient::new(config, ScriptedApi::default(), notifier, page, events.clone());
    client.initialize();
    Harness {
        client,
        events,
        receiver,
    }
}
