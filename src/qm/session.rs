//! Authenticated access to the QM server's OSLC REST API.
//!
//! **Design**:
//! - `QmClient` is the seam every pipeline talks to (GET / PUT of XML)
//! - `RemoteSession` is the blocking reqwest implementation
//! - `MockQmClient` serves canned documents and records traffic for tests
//!
//! The QM deployments run behind an internal CA, so certificate validation
//! is disabled for this client only.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::QmError;
use crate::config::{ACCEPT_XML, CONTENT_TYPE_RDF, OSLC_CORE_VERSION};

/// Endpoint probed once to validate credentials.
pub const IDENTITY_PATH: &str = "/authenticated/identity";

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Transport used by the fetch and update pipelines.
pub trait QmClient {
    /// GET `url` with the OSLC headers and return the body.
    fn get_xml(&self, url: &str) -> Result<String, QmError>;

    /// PUT `body` as RDF/XML to `url`.
    fn put_xml(&self, url: &str, body: &str) -> Result<(), QmError>;
}

// ═══════════════════════════════════════════════════════════
// RemoteSession
// ═══════════════════════════════════════════════════════════

/// HTTP session with basic authentication against one QM server.
pub struct RemoteSession {
    base_url: String,
    username: String,
    password: String,
    client: Client,
}

impl RemoteSession {
    /// Build a session without contacting the server.
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, QmError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| QmError::HttpClient(e.to_string()))?;

        tracing::debug!(base_url, "Certificate verification disabled for QM session");

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the identity endpoint so bad credentials fail here, not mid-run.
    pub fn authenticate(&self) -> Result<(), QmError> {
        let url = format!("{}{}", self.base_url, IDENTITY_PATH);
        self.get_xml(&url).map(|_| ())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .basic_auth(&self.username, Some(&self.password))
            .header(OSLC_CORE_VERSION.0, OSLC_CORE_VERSION.1)
    }

    fn send(&self, url: &str, builder: RequestBuilder) -> Result<Response, QmError> {
        let response = builder.send().map_err(|e| {
            if e.is_connect() {
                QmError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                QmError::HttpClient(format!("Request to {url} timed out"))
            } else {
                QmError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(QmError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        Ok(response)
    }
}

impl QmClient for RemoteSession {
    fn get_xml(&self, url: &str) -> Result<String, QmError> {
        let builder = self.authorized(self.client.get(url)).header(ACCEPT, ACCEPT_XML);
        let response = self.send(url, builder)?;
        let body = response
            .text()
            .map_err(|e| QmError::HttpClient(e.to_string()))?;

        tracing::debug!(url, bytes = body.len(), "Fetched QM resource");
        Ok(body)
    }

    fn put_xml(&self, url: &str, body: &str) -> Result<(), QmError> {
        let builder = self
            .authorized(self.client.put(url))
            .header(ACCEPT, ACCEPT_XML)
            .header(CONTENT_TYPE, CONTENT_TYPE_RDF)
            .body(body.to_string());
        self.send(url, builder)?;

        tracing::debug!(url, bytes = body.len(), "Updated QM resource");
        Ok(())
    }
}

/// Open a session and validate the credentials against the server.
pub fn session_authentication(
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<RemoteSession, QmError> {
    let session = RemoteSession::new(base_url, username, password)?;
    session.authenticate()?;
    tracing::info!(user = username, base_url = session.base_url(), "QM session established");
    Ok(session)
}

// ═══════════════════════════════════════════════════════════
// MockQmClient
// ═══════════════════════════════════════════════════════════

/// In-memory QM server for tests: canned GET bodies, recorded PUTs.
#[derive(Default)]
pub struct MockQmClient {
    documents: HashMap<String, String>,
    gets: RefCell<Vec<String>>,
    puts: RefCell<Vec<(String, String)>>,
}

impl MockQmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, url: &str, body: &str) -> Self {
        self.documents.insert(url.to_string(), body.to_string());
        self
    }

    /// URLs requested with GET, in order.
    pub fn gets(&self) -> Vec<String> {
        self.gets.borrow().clone()
    }

    /// `(url, body)` of every PUT, in order.
    pub fn puts(&self) -> Vec<(String, String)> {
        self.puts.borrow().clone()
    }
}

impl QmClient for MockQmClient {
    fn get_xml(&self, url: &str) -> Result<String, QmError> {
        self.gets.borrow_mut().push(url.to_string());
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| QmError::Status {
                status: 404,
                url: url.to_string(),
                body: String::new(),
            })
    }

    fn put_xml(&self, url: &str, body: &str) -> Result<(), QmError> {
        self.puts
            .borrow_mut()
            .push((url.to_string(), body.to_string()));
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
