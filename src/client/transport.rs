//! HTTP transport abstraction.
//!
//! The `Transport` trait lets the client talk to a real management server or
//! to an in-memory mock, the same way collectors read `/proc` through a
//! filesystem abstraction.

use std::fmt;
use std::sync::Mutex;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::{ConnectionSettings, TlsVerify};

/// Identifies this client to the management server.
const APPLICATION_TYPE: &str = concat!("pmaxstat-", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Decoded response: status code plus JSON body (`Null` when empty).
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Connection level failure: nothing usable came back.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::new(e.to_string())
    }
}

/// Request/response access to the management API.
pub trait Transport: Send + Sync {
    /// Sends one request. `params` become the query string.
    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response, TransportError>;

    fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Response, TransportError> {
        self.request(Method::Get, path, params, None)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Response, TransportError> {
        self.request(Method::Post, path, &[], Some(body))
    }

    /// Releases the session. Later requests fail.
    fn close(&self);
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response, TransportError> {
        (**self).request(method, path, params, body)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Blocking HTTPS transport with basic authentication.
pub struct RestTransport {
    base_url: String,
    username: String,
    password: String,
    client: Mutex<Option<Client>>,
}

impl RestTransport {
    /// Builds the HTTP session described by `settings`.
    pub fn connect(settings: &ConnectionSettings) -> Result<Self, TransportError> {
        let mut builder = Client::builder().timeout(settings.timeout);
        builder = match &settings.verify {
            TlsVerify::Disabled => builder.danger_accept_invalid_certs(true),
            TlsVerify::System => builder,
            TlsVerify::CaBundle(path) => {
                let pem = std::fs::read(path).map_err(|e| {
                    TransportError::new(format!("cannot read {}: {}", path.display(), e))
                })?;
                builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?)
            }
        };

        let client = builder.build()?;
        debug!("REST session opened to {}", settings.base_url());

        Ok(Self {
            base_url: settings.base_url(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            client: Mutex::new(Some(client)),
        })
    }

    fn session(&self) -> Result<Client, TransportError> {
        let guard = self
            .client
            .lock()
            .map_err(|_| TransportError::new("session lock poisoned"))?;
        // Client is reference counted; cloning shares the connection pool.
        guard
            .clone()
            .ok_or_else(|| TransportError::new("session is closed"))
    }
}

impl Transport for RestTransport {
    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response, TransportError> {
        let client = self.session()?;
        let url = format!("{}{}", self.base_url, path);
        trace!("{} {}", method, url);

        let mut request = match method {
            Method::Get => client.get(&url),
            Method::Post => client.post(&url),
        }
        .basic_auth(&self.username, Some(&self.password))
        .header(ACCEPT, "application/json")
        .header(CONTENT_TYPE, "application/json")
        .header("Application-Type", APPLICATION_TYPE);

        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send()?;
        let status = response.status().as_u16();
        let text = response.text()?;
        trace!("{} {} -> {} ({} bytes)", method, url, status, text.len());

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(Response { status, body })
    }

    fn close(&self) {
        if let Ok(mut guard) = self.client.lock()
            && guard.take().is_some()
        {
            debug!("REST session closed");
        }
    }
}
