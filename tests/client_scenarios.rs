mod support;

use support::fakes::{RecordingNotifier, harness, read, unread};

use snapflow_notify::badge::BadgeState;
use snapflow_notify::notifier::Permission;
use snapflow_notify::page::{self, ControlRole, READ_CLASS, UNREAD_CLASS};
use snapflow_notify::{ClientEvent, Command, NotificationId};

fn counter_text(client: &support::fakes::TestClient) -> String {
    let doc = client.page();
    let node = doc
        .query_selector(&client.config().count_selector)
        .unwrap()
        .unwrap();
    doc.get(node).unwrap().text().to_string()
}

#[test]
fn first_notifications_show_badge_and_popup() {
    let mut h = harness(0, Vec::new(), RecordingNotifier::new(Permission::Granted));
    assert_eq!(h.client.badge_state(), Some(BadgeState::Hidden));

    h.client.api().count(3);
    h.client.poll_tick();

    assert_eq!(h.client.unread_count(), 3);
    assert_eq!(h.client.badge_state(), Some(BadgeState::Visible));
    assert_eq!(counter_text(&h.client), "3");
    let shown = &h.client.notifier().shown;
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "SnapFlow");
    assert_eq!(shown[0].body, "You have 3 new notifications");
    assert_eq!(shown[0].icon, "/static/img/logo.png");
    assert_eq!(
        shown[0].click_url.as_deref(),
        Some("http://127.0.0.1:8000/notifications/")
    );
}

#[test]
fn popup_announces_only_the_increase() {
    let mut h = harness(2, Vec::new(), RecordingNotifier::new(Permission::Granted));
    h.client.api().count(3).count(3).count(1);
    h.client.poll_tick();
    h.client.poll_tick();
    h.client.poll_tick();
    let bodies: Vec<_> = h.client.notifier().shown.iter().map(|n| n.body.as_str()).collect();
    assert_eq!(bodies, ["You have 1 new notification"]);
    assert_eq!(h.client.unread_count(), 1);
}

#[test]
fn mark_read_click_applies_server_total_and_read_styling() {
    let mut h = harness(
        3,
        vec![unread(7), unread(8)],
        RecordingNotifier::new(Permission::Granted),
    );
    h.client.api().mark_read(2);
    let item = h
        .client
        .page()
        .query_selector(&page::item_selector(NotificationId(7)))
        .unwrap()
        .unwrap();
    let control = h
        .client
        .page()
        .query_selector_within(item, &ControlRole::MarkRead.selector())
        .unwrap()
        .unwrap();

    h.client.click(control);

    assert_eq!(*h.client.api().mark_read_calls.borrow(), [NotificationId(7)]);
    assert_eq!(h.client.unread_count(), 2);
    assert_eq!(h.client.badge_state(), Some(BadgeState::Visible));
    assert_eq!(counter_text(&h.client), "2");
    let element = h.client.page().get(item).unwrap();
    assert!(element.has_class(READ_CLASS));
    assert!(!element.has_class(UNREAD_CLASS));
    assert!(h.client.page().get(control).unwrap().is_display_none());
    assert!(h.client.notifier().shown.is_empty());
}

#[test]
fn failed_mark_read_leaves_page_alone() {
    let mut h = harness(3, vec![unread(7)], RecordingNotifier::new(Permission::Granted));
    h.client.api().mark_read_fails();
    h.client.mark_read(NotificationId(7));
    assert_eq!(h.client.unread_count(), 3);
    let item = h
        .client
        .page()
        .query_selector(&page::item_selector(NotificationId(7)))
        .unwrap()
        .unwrap();
    assert!(h.client.page().get(item).unwrap().has_class(UNREAD_CLASS));
}

#[test]
fn delete_removes_item_and_refreshes_once() {
    let mut h = harness(
        2,
        vec![unread(7), unread(8)],
        RecordingNotifier::new(Permission::Granted),
    );
    h.client.api().delete().count(1);

    h.client.delete_notification(NotificationId(7));

    assert_eq!(*h.client.api().delete_calls.borrow(), [NotificationId(7)]);
    assert_eq!(h.client.api().count_calls.get(), 1);
    assert_eq!(h.client.unread_count(), 1);
    let doc = h.client.page();
    assert!(doc.query_selector(&page::item_selector(NotificationId(7))).unwrap().is_none());
    assert!(doc.query_selector(&page::item_selector(NotificationId(8))).unwrap().is_some());
}

#[test]
fn failed_delete_keeps_item_and_skips_refresh() {
    let mut h = harness(2, vec![unread(7)], RecordingNotifier::new(Permission::Granted));
    h.client.api().delete_fails();
    h.client.delete_notification(NotificationId(7));
    assert_eq!(h.client.api().count_calls.get(), 0);
    assert!(
        h.client
            .page()
            .query_selector(&page::item_selector(NotificationId(7)))
            .unwrap()
            .is_some()
    );
}

#[test]
fn failed_poll_leaves_count_and_badge_unchanged() {
    let mut h = harness(4, Vec::new(), RecordingNotifier::new(Permission::Granted));
    h.client.api().count_fails();
    h.client.poll_tick();
    assert_eq!(h.client.unread_count(), 4);
    assert_eq!(h.client.badge_state(), Some(BadgeState::Visible));
    assert_eq!(counter_text(&h.client), "4");
}

#[test]
fn denied_permission_never_emits_or_prompts() {
    let mut h = harness(0, Vec::new(), RecordingNotifier::new(Permission::Denied));
    h.client.api().count(1).count(5).count(9);
    for _ in 0..3 {
        h.client.poll_tick();
    }
    assert_eq!(h.client.unread_count(), 9);
    assert!(h.client.notifier().shown.is_empty());
    assert_eq!(h.client.notifier().requests, 0);
}

#[test]
fn undecided_permission_is_requested_once_at_start() {
    let granted = harness(
        0,
        Vec::new(),
        RecordingNotifier::new(Permission::Default).answering(Permission::Granted),
    );
    assert_eq!(granted.client.notifier().requests, 1);
    assert_eq!(granted.client.notifier().permission, Permission::Granted);

    let mut refused = harness(
        0,
        Vec::new(),
        RecordingNotifier::new(Permission::Default).answering(Permission::Denied),
    );
    refused.client.api().count(2);
    refused.client.poll_tick();
    assert_eq!(refused.client.notifier().requests, 1);
    assert!(refused.client.notifier().shown.is_empty());
}

#[test]
fn badge_tracks_last_applied_count() {
    let mut h = harness(0, Vec::new(), RecordingNotifier::new(Permission::Denied));
    let script: [Option<u64>; 8] = [Some(2), Some(0), None, Some(0), Some(7), None, Some(3), Some(0)];
    let mut last = 0;
    for step in script {
        match step {
            Some(count) => {
                h.client.api().count(count);
                last = count;
            }
            None => {
                h.client.api().count_fails();
            }
        }
        h.client.poll_tick();
        assert_eq!(h.client.unread_count(), last);
        assert_eq!(h.client.badge_state(), Some(BadgeState::for_count(last)));
    }
}

#[test]
fn mark_all_read_restyles_every_item_then_refreshes() {
    let mut h = harness(
        2,
        vec![unread(7), unread(8), read(9)],
        RecordingNotifier::new(Permission::Granted),
    );
    h.client.api().mark_all().count(0);
    h.client.mark_all_read();
    let doc = h.client.page();
    assert_eq!(doc.count(&format!(".{UNREAD_CLASS}")).unwrap(), 0);
    assert_eq!(doc.count(&format!(".{READ_CLASS}")).unwrap(), 3);
    assert_eq!(h.client.api().count_calls.get(), 1);
    assert_eq!(h.client.badge_state(), Some(BadgeState::Hidden));
}

#[test]
fn push_notification_reconciles_like_a_poll() {
    let mut h = harness(1, Vec::new(), RecordingNotifier::new(Permission::Granted));
    h.client.api().count(2);
    h.client.handle_push_message(r#"{"type":"notification"}"#);
    assert_eq!(h.client.unread_count(), 2);
    assert_eq!(h.client.notifier().shown.len(), 1);
}

#[test]
fn event_loop_runs_commands_until_quit() {
    let mut h = harness(0, vec![unread(7)], RecordingNotifier::new(Permission::Denied));
    h.client.api().count(4).mark_read(3);
    for event in [
        ClientEvent::Command(Command::Refresh),
        ClientEvent::Command(Command::MarkRead(NotificationId(7))),
        ClientEvent::Command(Command::Quit),
        ClientEvent::PollTick,
    ] {
        h.events.send(event).unwrap();
    }
    let mut seen = Vec::new();
    h.client.run(&h.receiver, |client| seen.push(client.unread_count()));
    assert_eq!(seen, [4, 3, 3]);
    assert_eq!(h.client.api().count_calls.get(), 1);
    assert!(!h.client.is_polling());
}

#[test]
fn shutdown_event_stops_loop_and_timer() {
    let mut h = harness(2, Vec::new(), RecordingNotifier::new(Permission::Denied));
    h.client.api().count(5);
    for event in [
        ClientEvent::Shutdown,
        ClientEvent::Command(Command::Refresh),
    ] {
        h.events.send(event).unwrap();
    }
    let mut seen = Vec::new();
    h.client.run(&h.receiver, |client| seen.push(client.unread_count()));
    assert_eq!(seen, [2]);
    assert_eq!(h.client.api().count_calls.get(), 0);
    assert!(!h.client.is_polling());
    assert!(matches!(
        h.receiver.try_recv(),
        Ok(ClientEvent::Command(Command::Refresh))
    ));
}
