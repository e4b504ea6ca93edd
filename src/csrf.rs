//! Anti-forgery token providers injected into the HTTP API.

use crate::dom::Document;
use crate::page;

/// Supplies the token sent in the `X-CSRFToken` header of mutating requests.
pub trait CsrfTokenProvider {
    /// Current token, or `None` when the page has none.
    fn csrf_token(&self) -> Option<String>;
}

impl<T: CsrfTokenProvider + ?Sized> CsrfTokenProvider for Box<T> {
    fn csrf_token(&self) -> Option<String> {
        (**self).csrf_token()
    }
}

/// Token captured from a page: cookie first, hidden form field second.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageToken {
    token: Option<String>,
}

impl PageToken {
    pub fn from_document(doc: &Document, cookie_name: &str) -> Self {
        let token = cookie_value(&doc.cookie_string(), cookie_name)
            .or_else(|| page::csrf_field_value(doc));
        Self { token }
    }
}

impl CsrfTokenProvider for PageToken {
    fn csrf_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Value of cookie `name` in a `Cookie` header string.
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
