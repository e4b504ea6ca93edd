//! In-memory page model: an element tree with compound-selector queries.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Removing a node
//! detaches its subtree; detached nodes stay addressable but no longer match
//! any query made from the document root.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Handle to an element inside one [`Document`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Errors raised by page operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("No element matches '{0}'")]
    MissingTarget(String),
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("Cannot append {child:?} inside its own subtree at {parent:?}")]
    Cycle { parent: NodeId, child: NodeId },
}

/// A single element: tag, attributes, classes, text and tree links.
#[derive(Clone, Debug, Default)]
pub struct Element {
    tag: String,
    attributes: BTreeMap<String, String>,
    classes: Vec<String>,
    text: String,
    display: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Element {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Value of `data-<name>`.
    pub fn data(&self, name: &str) -> Option<&str> {
        self.attribute(&format!("data-{name}"))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|existing| existing == class)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Inline `display` style, if one was set.
    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    pub fn is_display_none(&self) -> bool {
        self.display() == Some("none")
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if name == "class" {
            self.classes = value.split_whitespace().map(str::to_string).collect();
        } else {
            self.attributes.insert(name.to_string(), value);
        }
    }

    pub fn add_class(&mut self, class: &str) {
        if !self.has_class(class) {
            self.classes.push(class.to_string());
        }
    }

    pub fn remove_class(&mut self, class: &str) {
        self.classes.retain(|existing| existing != class);
    }

    /// Add or remove `class` depending on `present`.
    pub fn toggle_class(&mut self, class: &str, present: bool) {
        if present {
            self.add_class(class);
        } else {
            self.remove_class(class);
        }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn set_display(&mut self, display: Option<&str>) {
        self.display = display.map(str::to_string);
    }
}

/// Element tree plus the page's cookie jar.
#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<Element>,
    cookies: Vec<(String, String)>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document containing only its root element.
    pub fn new() -> Self {
        Self {
            nodes: vec![Element {
                tag: "html".to_string(),
                ..Element::default()
            }],
            cookies: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Create a detached element; attach it with [`Document::append_child`].
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Element {
            tag: tag.to_ascii_lowercase(),
            ..Element::default()
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node.0)
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        self.nodes.get_mut(node.0)
    }

    /// Move `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), PageError> {
        if self.get(parent).is_none() {
            return Err(PageError::UnknownNode(parent));
        }
        if self.get(child).is_none() || child == self.root() {
            return Err(PageError::UnknownNode(child));
        }
        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == child {
                return Err(PageError::Cycle { parent, child });
            }
            ancestor = self.nodes[id.0].parent;
        }
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Detach `node` and its subtree from the tree.
    pub fn remove(&mut self, node: NodeId) -> Result<(), PageError> {
        if self.get(node).is_none() || node == self.root() {
            return Err(PageError::UnknownNode(node));
        }
        self.detach(node);
        Ok(())
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != node);
        }
    }

    /// Whether `node` is reachable from the root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root() {
                return true;
            }
            current = self.get(id).and_then(Element::parent);
        }
        false
    }

    /// First element in document order matching `selector`.
    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, PageError> {
        self.query_selector_within(self.root(), selector)
    }

    /// Every element in document order matching `selector`.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, PageError> {
        let selector = selector.parse::<Selector>()?;
        Ok(self
            .descendants(self.root())
            .filter(|node| selector.matches(&self.nodes[node.0]))
            .collect())
    }

    /// First descendant of `scope` matching `selector`.
    pub fn query_selector_within(
        &self,
        scope: NodeId,
        selector: &str,
    ) -> Result<Option<NodeId>, PageError> {
        let selector = selector.parse::<Selector>()?;
        if self.get(scope).is_none() {
            return Err(PageError::UnknownNode(scope));
        }
        Ok(self
            .descendants(scope)
            .find(|node| selector.matches(&self.nodes[node.0])))
    }

    /// Count of connected elements matching `selector`.
    pub fn count(&self, selector: &str) -> Result<usize, PageError> {
        Ok(self.query_selector_all(selector)?.len())
    }

    fn descendants(&self, scope: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.nodes[scope.0].children.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(self.nodes[node.0].children.iter().rev().copied());
            Some(node)
        })
    }

    /// Set or replace one cookie.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        match self.cookies.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.cookies.push((name.to_string(), value.to_string())),
        }
    }

    /// Cookies serialized the way a `Cookie` header carries them.
    pub fn cookie_string(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Compound selector: optional tag, `#id`, `.class` and `[attr]`/`[attr="v"]` parts.
///
/// Combinators are not supported; scope queries with
/// [`Document::query_selector_within`] instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Selector {
    /// Create a detached element that this selector matches.
    pub fn instantiate(&self, doc: &mut Document, default_tag: &str) -> NodeId {
        let node = doc.create_element(self.tag.as_deref().unwrap_or(default_tag));
        let element = &mut doc.nodes[node.0];
        if let Some(id) = &self.id {
            element.set_attribute("id", id.as_str());
        }
        for class in &self.classes {
            element.add_class(class);
        }
        for (name, value) in &self.attributes {
            element.set_attribute(name, value.clone().unwrap_or_default());
        }
        node
    }

    pub fn matches(&self, element: &Element) -> bool {
        if self.tag.as_deref().is_some_and(|tag| tag != element.tag) {
            return false;
        }
        if self.id.is_some() && self.id.as_deref() != element.id() {
            return false;
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return false;
        }
        self.attributes.iter().all(|(name, expected)| {
            let actual = if name == "class" {
                (!element.classes.is_empty()).then(|| element.classes.join(" "))
            } else {
                element.attribute(name).map(str::to_string)
            };
            match (expected, actual) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(expected), Some(actual)) => *expected == actual,
            }
        })
    }
}

impl FromStr for Selector {
    type Err = PageError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| PageError::InvalidSelector {
            selector: source.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty selector"));
        }
        let mut selector = Selector::default();
        let mut chars = trimmed.chars().peekable();
        if chars.peek().is_some_and(|ch| is_ident_char(*ch) || *ch == '*') {
            let tag = take_ident(&mut chars, true);
            if tag != "*" {
                selector.tag = Some(tag.to_ascii_lowercase());
            }
        }
        while let Some(ch) = chars.next() {
            match ch {
                '#' => {
                    let id = take_ident(&mut chars, false);
                    if id.is_empty() {
                        return Err(invalid("expected id after '#'"));
                    }
                    selector.id = Some(id);
                }
                '.' => {
                    let class = take_ident(&mut chars, false);
                    if class.is_empty() {
                        return Err(invalid("expected class after '.'"));
                    }
                    selector.classes.push(class);
                }
                '[' => {
                    let name = take_ident(&mut chars, false);
                    if name.is_empty() {
                        return Err(invalid("expected attribute name"));
                    }
                    let value = match chars.next() {
                        Some(']') => None,
                        Some('=') => {
                            let value = take_attribute_value(&mut chars)
                                .ok_or_else(|| invalid("unterminated attribute value"))?;
                            if chars.next() != Some(']') {
                                return Err(invalid("expected ']'"));
                            }
                            Some(value)
                        }
                        _ => return Err(invalid("expected ']' or '='")),
                    };
                    selector.attributes.push((name, value));
                }
                other if other.is_whitespace() || other == '>' || other == ',' => {
                    return Err(invalid("combinators are not supported"));
                }
                other => return Err(invalid(&format!("unexpected '{other}'"))),
            }
        }
        Ok(selector)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            write!(f, "{tag}")?;
        }
        if let Some(id) = &self.id {
            write!(f, "#{id}")?;
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        for (name, value) in &self.attributes {
            match value {
                Some(value) => write!(f, "[{name}=\"{value}\"]")?,
                None => write!(f, "[{name}]")?,
            }
        }
        Ok(())
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, allow_star: bool) -> String {
    let mut ident = String::new();
    if allow_star && chars.peek() == Some(&'*') {
        chars.next();
        return "*".to_string();
    }
    while let Some(ch) = chars.peek().copied().filter(|ch| is_ident_char(*ch)) {
        ident.push(ch);
        chars.next();
    }
    ident
}

fn take_attribute_value(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    match chars.peek().copied() {
        Some(quote @ ('"' | '\'')) => {
            chars.next();
            let mut value = String::new();
            for ch in chars.by_ref() {
                if ch == quote {
                    return Some(value);
                }
                value.push(ch);
            }
            None
        }
        Some(_) => Some(take_ident(chars, false)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_page() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let list = doc.create_element("ul");
        doc.get_mut(list).unwrap().set_attribute("id", "notifications");
        doc.append_child(root, list).unwrap();
        let first = doc.create_element("li");
        doc.get_mut(first).unwrap().set_attribute("class", "item unread");
        doc.get_mut(first).unwrap().set_attribute("data-notification-id", "7");
        doc.append_child(list, first).unwrap();
        let button = doc.create_element("button");
        doc.get_mut(button).unwrap().set_attribute("class", "mark-read-btn");
        doc.get_mut(button).unwrap().set_attribute("data-notification-id", "7");
        doc.append_child(first, button).unwrap();
        (doc, first, button)
    }

    #[test]
    fn refuses_to_append_into_own_subtree() {
        let (mut doc, first, button) = list_page();
        let list = doc.get(first).unwrap().parent().unwrap();
        assert_eq!(
            doc.append_child(first, first),
            Err(PageError::Cycle {
                parent: first,
                child: first
            })
        );
        assert_eq!(
            doc.append_child(button, list),
            Err(PageError::Cycle {
                parent: button,
                child: list
            })
        );
        assert!(doc.is_connected(button));
        assert_eq!(doc.get(list).unwrap().parent(), Some(doc.root()));
        assert_eq!(doc.descendants(doc.root()).count(), 3);
    }

    #[test]
    fn parses_compound_selectors() {
        let selector: Selector = "li.item.unread[data-notification-id=\"7\"]".parse().unwrap();
        assert_eq!(selector.to_string(), "li.item.unread[data-notification-id=\"7\"]");
        let meta: Selector = "meta[name='notification-push-url']".parse().unwrap();
        assert_eq!(meta.to_string(), "meta[name=\"notification-push-url\"]");
    }

    #[test]
    fn rejects_combinators_and_garbage() {
        assert!("ul li".parse::<Selector>().is_err());
        assert!("#".parse::<Selector>().is_err());
        assert!("[data-x=\"open".parse::<Selector>().is_err());
        assert!("".parse::<Selector>().is_err());
    }

    #[test]
    fn query_returns_first_match_in_document_order() {
        let (doc, first, button) = list_page();
        assert_eq!(
            doc.query_selector("[data-notification-id=\"7\"]").unwrap(),
            Some(first)
        );
        assert_eq!(
            doc.query_selector_all("[data-notification-id=\"7\"]").unwrap(),
            vec![first, button]
        );
        assert_eq!(
            doc.query_selector_within(first, ".mark-read-btn").unwrap(),
            Some(button)
        );
        assert_eq!(doc.query_selector("#missing").unwrap(), None);
    }

    #[test]
    fn removed_subtree_no_longer_matches() {
        let (mut doc, first, button) = list_page();
        doc.remove(first).unwrap();
        assert!(!doc.is_connected(first));
        assert!(!doc.is_connected(button));
        assert_eq!(doc.count(".mark-read-btn").unwrap(), 0);
        assert!(doc.get(button).is_some());
    }

    #[test]
    fn class_attribute_and_class_list_stay_in_sync() {
        let (mut doc, first, _) = list_page();
        let element = doc.get_mut(first).unwrap();
        element.remove_class("unread");
        element.add_class("read");
        element.toggle_class("item", false);
        assert_eq!(element.classes(), ["read".to_string()]);
        assert_eq!(doc.query_selector("[class=\"read\"]").unwrap(), Some(first));
    }

    #[test]
    fn instantiated_element_matches_its_selector() {
        let mut doc = Document::new();
        let selector: Selector = "button.menu[aria-label=\"Alerts\"]".parse().unwrap();
        let node = selector.instantiate(&mut doc, "span");
        doc.append_child(doc.root(), node).unwrap();
        assert_eq!(doc.get(node).unwrap().tag(), "button");
        assert_eq!(doc.query_selector(&selector.to_string()).unwrap(), Some(node));
    }

    #[test]
    fn cookies_replace_by_name() {
        let mut doc = Document::new();
        doc.set_cookie("csrftoken", "one");
        doc.set_cookie("sessionid", "abc");
        doc.set_cookie("csrftoken", "two");
        assert_eq!(doc.cookie_string(), "csrftoken=two; sessionid=abc");
    }
}
