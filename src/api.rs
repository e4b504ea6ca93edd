//! Client for the notification endpoints.

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, ConfigError};
use crate::csrf::{CsrfTokenProvider, PageToken};
use crate::dom::Document;
use crate::http_client;
use crate::NotificationId;

const MAX_RESPONSE_BYTES: usize = 64 * 1024;
const REQUESTED_WITH: (&str, &str) = ("X-Requested-With", "XMLHttpRequest");

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("Server answered HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Server rejected the request")]
    Rejected,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Body of a successful mark-read call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkReadOutcome {
    pub unread_count: u64,
}

/// Operations the client needs from the server.
pub trait NotificationApi {
    /// Current unread total.
    fn unread_count(&self) -> Result<u64, ApiError>;
    fn mark_read(&self, id: NotificationId) -> Result<MarkReadOutcome, ApiError>;
    fn delete(&self, id: NotificationId) -> Result<(), ApiError>;
    fn mark_all_read(&self) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct CountWire {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct MarkReadWire {
    #[serde(default)]
    success: bool,
    unread_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DeleteWire {
    #[serde(default)]
    success: bool,
}

/// [`NotificationApi`] over HTTP with a shared `ureq` agent.
pub struct HttpNotificationApi<T> {
    config: ClientConfig,
    cookie_header: Option<String>,
    tokens: T,
}

impl<T: CsrfTokenProvider> HttpNotificationApi<T> {
    pub fn new(config: ClientConfig, tokens: T) -> Self {
        Self {
            config,
            cookie_header: None,
            tokens,
        }
    }

    /// Send `cookie` as the `Cookie` header on every request.
    pub fn with_cookie_header(mut self, cookie: impl Into<String>) -> Self {
        self.cookie_header = Some(cookie.into());
        self
    }

    fn get(&self, path: &str) -> Result<ureq::Response, ApiError> {
        let url = self.config.resolve(path)?;
        debug!("GET {url}");
        let request = self.decorate(http_client::agent().get(url.as_str()));
        map_call(request.call())
    }

    fn post(&self, path: &str) -> Result<ureq::Response, ApiError> {
        let url = self.config.resolve(path)?;
        debug!("POST {url}");
        let mut request = self
            .decorate(http_client::agent().post(url.as_str()))
            .set("Referer", self.referer()?.as_str());
        if let Some(token) = self.tokens.csrf_token() {
            request = request.set("X-CSRFToken", &token);
        }
        map_call(request.send_string(""))
    }

    fn decorate(&self, request: ureq::Request) -> ureq::Request {
        let request = request
            .set(REQUESTED_WITH.0, REQUESTED_WITH.1)
            .set("Accept", "application/json");
        match &self.cookie_header {
            Some(cookie) => request.set("Cookie", cookie),
            None => request,
        }
    }

    fn referer(&self) -> Result<Url, ApiError> {
        Ok(self.config.resolve(&self.config.list_url)?)
    }
}

impl HttpNotificationApi<PageToken> {
    /// API whose anti-forgery token is read from `page`, cookie first.
    pub fn for_page(config: ClientConfig, page: &Document) -> Self {
        let tokens = PageToken::from_document(page, &config.csrf_cookie_name);
        Self::new(config, tokens)
    }
}

impl<T: CsrfTokenProvider> NotificationApi for HttpNotificationApi<T> {
    fn unread_count(&self) -> Result<u64, ApiError> {
        let body = read_body(self.get(&self.config.check_url)?)?;
        parse_count(&body)
    }

    fn mark_read(&self, id: NotificationId) -> Result<MarkReadOutcome, ApiError> {
        let body = read_body(self.post(&self.config.mark_read_path(id))?)?;
        parse_mark_read(&body)
    }

    fn delete(&self, id: NotificationId) -> Result<(), ApiError> {
        let body = read_body(self.post(&self.config.delete_path(id))?)?;
        parse_delete(&body)
    }

    fn mark_all_read(&self) -> Result<(), ApiError> {
        // Answered with a redirect to the list page; reaching a 2xx is enough.
        self.post(&self.config.mark_all_read_url).map(|_| ())
    }
}

fn map_call(result: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, ApiError> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code, response)) => {
            let body = http_client::read_response_text(response, MAX_RESPONSE_BYTES)
                .unwrap_or_else(|err| err.to_string());
            Err(ApiError::Status { code, body })
        }
        Err(ureq::Error::Transport(err)) => Err(ApiError::Transport(err.to_string())),
    }
}

fn read_body(response: ureq::Response) -> Result<String, ApiError> {
    http_client::read_response_text(response, MAX_RESPONSE_BYTES)
        .map_err(|err| ApiError::Malformed(err.to_string()))
}

fn parse_json<'a, W: Deserialize<'a>>(body: &'a str) -> Result<W, ApiError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Malformed("Empty response body".to_string()));
    }
    serde_json::from_str(trimmed).map_err(|err| ApiError::Malformed(format!("{err}: {trimmed}")))
}

fn parse_count(body: &str) -> Result<u64, ApiError> {
    parse_json::<CountWire>(body).map(|wire| wire.count)
}

fn parse_mark_read(body: &str) -> Result<MarkReadOutcome, ApiError> {
    let wire: MarkReadWire = parse_json(body)?;
    if !wire.success {
        return Err(ApiError::Rejected);
    }
    let unread_count = wire
        .unread_count
        .ok_or_else(|| ApiError::Malformed("Missing unread_count".to_string()))?;
    Ok(MarkReadOutcome { unread_count })
}

fn parse_delete(body: &str) -> Result<(), ApiError> {
    let wire: DeleteWire = parse_json(body)?;
    if wire.success { Ok(()) } else { Err(ApiError::Rejected) }
}
