//! Layout contract of the notification page.
//!
//! List items carry `data-notification-id`, unread items have the
//! [`UNREAD_CLASS`] background, and each item holds a mark-read and a delete
//! control tagged with the same id.

use tracing::debug;

use crate::config::ClientConfig;
use crate::dom::{Document, NodeId, PageError, Selector};
use crate::NotificationId;

pub const ID_ATTRIBUTE: &str = "data-notification-id";
pub const ITEM_CLASS: &str = "notification-item";
pub const MARK_READ_CLASS: &str = "mark-read-btn";
pub const DELETE_CLASS: &str = "delete-notification-btn";
pub const UNREAD_CLASS: &str = "bg-blue-50";
pub const READ_CLASS: &str = "bg-white";
/// `name` of the meta tag advertising the push channel URL.
pub const PUSH_META_NAME: &str = "notification-push-url";
/// Hidden form field holding the anti-forgery token.
pub const CSRF_FIELD_NAME: &str = "csrfmiddlewaretoken";

/// Role of a clickable control inside a list item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlRole {
    MarkRead,
    Delete,
}

impl ControlRole {
    pub fn selector(self) -> String {
        match self {
            Self::MarkRead => format!(".{MARK_READ_CLASS}"),
            Self::Delete => format!(".{DELETE_CLASS}"),
        }
    }
}

/// Selector of the list item for `id`.
pub fn item_selector(id: NotificationId) -> String {
    format!(".{ITEM_CLASS}[{ID_ATTRIBUTE}=\"{id}\"]")
}

/// Parse the notification id carried by `node`, if any.
pub fn notification_id_of(doc: &Document, node: NodeId) -> Option<NotificationId> {
    doc.get(node)?.attribute(ID_ATTRIBUTE)?.parse().ok()
}

/// Read the initial unread count from the counter text, defaulting to 0.
pub fn read_initial_count(doc: &Document, count_selector: &str) -> u64 {
    let text = match doc.query_selector(count_selector) {
        Ok(Some(node)) => doc.get(node).map(|element| element.text().trim().to_string()),
        Ok(None) => None,
        Err(err) => {
            debug!("Initial count unavailable: {err}");
            None
        }
    };
    text.and_then(|text| text.parse().ok()).unwrap_or(0)
}

/// URL advertised by the push-channel meta tag.
pub fn push_channel_url(doc: &Document) -> Option<String> {
    let node = doc
        .query_selector(&format!("meta[name=\"{PUSH_META_NAME}\"]"))
        .ok()??;
    doc.get(node)?
        .attribute("content")
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

/// Value of the hidden anti-forgery form field.
pub fn csrf_field_value(doc: &Document) -> Option<String> {
    let node = doc
        .query_selector(&format!("input[name=\"{CSRF_FIELD_NAME}\"]"))
        .ok()??;
    doc.get(node)?
        .attribute("value")
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Restyle the item for `id` as read and hide its mark-read control.
pub fn mark_item_read(doc: &mut Document, id: NotificationId) -> Result<(), PageError> {
    let selector = item_selector(id);
    let item = doc
        .query_selector(&selector)?
        .ok_or(PageError::MissingTarget(selector))?;
    restyle_as_read(doc, item)
}

/// Restyle every unread item as read.
pub fn mark_all_items_read(doc: &mut Document) -> Result<usize, PageError> {
    let items = doc.query_selector_all(&format!(".{ITEM_CLASS}.{UNREAD_CLASS}"))?;
    for item in &items {
        restyle_as_read(doc, *item)?;
    }
    Ok(items.len())
}

fn restyle_as_read(doc: &mut Document, item: NodeId) -> Result<(), PageError> {
    let control = doc.query_selector_within(item, &ControlRole::MarkRead.selector())?;
    let element = doc.get_mut(item).ok_or(PageError::UnknownNode(item))?;
    element.remove_class(UNREAD_CLASS);
    element.add_class(READ_CLASS);
    if let Some(control) = control.and_then(|node| doc.get_mut(node)) {
        control.set_display(Some("none"));
    }
    Ok(())
}

/// Remove the list item for `id` from the page.
pub fn remove_item(doc: &mut Document, id: NotificationId) -> Result<(), PageError> {
    let selector = item_selector(id);
    let item = doc
        .query_selector(&selector)?
        .ok_or(PageError::MissingTarget(selector))?;
    doc.remove(item)
}

/// One list entry in a generated page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageItem {
    pub id: NotificationId,
    pub title: String,
    pub unread: bool,
}

/// Inputs for [`build_page`].
#[derive(Clone, Debug, Default)]
pub struct PageLayout {
    pub unread_count: u64,
    pub items: Vec<PageItem>,
    pub push_url: Option<String>,
    pub csrf_token: Option<String>,
}

/// Build the header badge, counter and notification list for `layout`.
///
/// The counter and badge container are created to match the configured
/// selectors so the client finds them again.
pub fn build_page(config: &ClientConfig, layout: &PageLayout) -> Result<Document, PageError> {
    let mut doc = Document::new();
    let root = doc.root();

    if let Some(url) = &layout.push_url {
        let meta = doc.create_element("meta");
        let element = doc.get_mut(meta).ok_or(PageError::UnknownNode(meta))?;
        element.set_attribute("name", PUSH_META_NAME);
        element.set_attribute("content", url.as_str());
        doc.append_child(root, meta)?;
    }

    let menu = config.menu_selector.parse::<Selector>()?.instantiate(&mut doc, "button");
    doc.append_child(root, menu)?;
    let counter = config.count_selector.parse::<Selector>()?.instantiate(&mut doc, "span");
    if let Some(element) = doc.get_mut(counter) {
        element.set_text(layout.unread_count.to_string());
        element.toggle_class("hidden", layout.unread_count == 0);
    }
    doc.append_child(menu, counter)?;

    if let Some(token) = &layout.csrf_token {
        let field = doc.create_element("input");
        let element = doc.get_mut(field).ok_or(PageError::UnknownNode(field))?;
        element.set_attribute("type", "hidden");
        element.set_attribute("name", CSRF_FIELD_NAME);
        element.set_attribute("value", token.as_str());
        doc.append_child(root, field)?;
    }

    let list = doc.create_element("ul");
    doc.append_child(root, list)?;
    for item in &layout.items {
        append_item(&mut doc, list, item)?;
    }
    Ok(doc)
}

fn append_item(doc: &mut Document, list: NodeId, item: &PageItem) -> Result<(), PageError> {
    let id = item.id.to_string();
    let li = doc.create_element("li");
    if let Some(element) = doc.get_mut(li) {
        element.add_class(ITEM_CLASS);
        element.add_class(if item.unread { UNREAD_CLASS } else { READ_CLASS });
        element.set_attribute(ID_ATTRIBUTE, id.as_str());
        element.set_text(item.title.as_str());
    }
    doc.append_child(list, li)?;

    let mut roles = vec![ControlRole::Delete];
    if item.unread {
        roles.insert(0, ControlRole::MarkRead);
    }
    for role in roles {
        let button = doc.create_element("button");
        if let Some(element) = doc.get_mut(button) {
            element.add_class(match role {
                ControlRole::MarkRead => MARK_READ_CLASS,
                ControlRole::Delete => DELETE_CLASS,
            });
            element.set_attribute(ID_ATTRIBUTE, id.as_str());
        }
        doc.append_child(li, button)?;
    }
    Ok(())
}
