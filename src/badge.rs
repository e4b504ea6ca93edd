//! Reflects the unread count into the header badge.
//!
//! The rendered state depends on the count alone: a positive count shows the
//! indicator dot and the numeric counter, zero removes the dot and hides the
//! counter.

use crate::dom::{Document, NodeId, PageError};

/// Class that identifies the indicator dot inside the badge container.
pub const INDICATOR_CLASS: &str = "notification-indicator";
/// Full class list given to a newly created indicator.
pub const INDICATOR_CLASSES: &[&str] = &[
    INDICATOR_CLASS,
    "absolute",
    "top-0",
    "right-0",
    "block",
    "h-2",
    "w-2",
    "rounded-full",
    "bg-red-500",
    "ring-2",
    "ring-white",
];
/// Class that hides the numeric counter.
pub const HIDDEN_CLASS: &str = "hidden";

/// Observable badge state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BadgeState {
    Hidden,
    Visible,
}

impl BadgeState {
    pub fn for_count(count: u64) -> Self {
        if count > 0 { Self::Visible } else { Self::Hidden }
    }
}

/// Where the badge lives in the page.
#[derive(Clone, Copy, Debug)]
pub struct BadgeTargets<'a> {
    /// Container that receives the indicator dot.
    pub container: &'a str,
    /// Numeric counter element.
    pub counter: &'a str,
}

/// Render `count` into the badge.
///
/// Either target may be absent from the page; when both are, the call fails
/// with [`PageError::MissingTarget`].
pub fn render(doc: &mut Document, targets: BadgeTargets<'_>, count: u64) -> Result<BadgeState, PageError> {
    let state = BadgeState::for_count(count);
    let counter = doc.query_selector(targets.counter)?;
    let container = doc.query_selector(targets.container)?;
    if counter.is_none() && container.is_none() {
        return Err(PageError::MissingTarget(format!(
            "{} / {}",
            targets.container, targets.counter
        )));
    }

    if let Some(element) = counter.and_then(|node| doc.get_mut(node)) {
        element.set_text(count.to_string());
        element.toggle_class(HIDDEN_CLASS, state == BadgeState::Hidden);
    }
    if let Some(container) = container {
        sync_indicator(doc, container, state)?;
    }
    Ok(state)
}

fn sync_indicator(doc: &mut Document, container: NodeId, state: BadgeState) -> Result<(), PageError> {
    let existing = doc.query_selector_within(container, &format!(".{INDICATOR_CLASS}"))?;
    match (state, existing) {
        (BadgeState::Visible, None) => {
            let dot = doc.create_element("span");
            if let Some(element) = doc.get_mut(dot) {
                for class in INDICATOR_CLASSES {
                    element.add_class(class);
                }
            }
            doc.append_child(container, dot)
        }
        (BadgeState::Hidden, Some(dot)) => doc.remove(dot),
        _ => Ok(()),
    }
}

/// Read the badge state back from the page.
///
/// The indicator decides when the container exists; otherwise the counter's
/// `hidden` class does.
pub fn observed_state(doc: &Document, targets: BadgeTargets<'_>) -> Result<BadgeState, PageError> {
    if let Some(container) = doc.query_selector(targets.container)? {
        let dot = doc.query_selector_within(container, &format!(".{INDICATOR_CLASS}"))?;
        return Ok(if dot.is_some() {
            BadgeState::Visible
        } else {
            BadgeState::Hidden
        });
    }
    let counter = doc
        .query_selector(targets.counter)?
        .and_then(|node| doc.get(node))
        .ok_or_else(|| PageError::MissingTarget(targets.counter.to_string()))?;
    Ok(if counter.has_class(HIDDEN_CLASS) {
        BadgeState::Hidden
    } else {
        BadgeState::Visible
    })
}
