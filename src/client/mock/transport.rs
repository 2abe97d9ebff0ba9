//! In-memory mock transport for testing collectors without a management server.
//!
//! Routes are matched on method and path. A route can additionally require
//! query parameters or body fields to hold given values, which lets several
//! assets share one performance endpoint. Unmatched requests answer 404.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};

use crate::client::transport::{Method, Response, Transport, TransportError};

#[derive(Debug, Clone)]
enum Reply {
    Respond(Response),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    path: String,
    /// (name, value) pairs that must match a query parameter or body field.
    when: Vec<(String, String)>,
    reply: Reply,
}

impl Route {
    fn matches(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> bool {
        self.method == method
            && self.path == path
            && self.when.iter().all(|(name, expected)| {
                params
                    .iter()
                    .any(|(k, v)| *k == name.as_str() && v == expected)
                    || body
                        .and_then(|b| b.get(name.as_str()))
                        .is_some_and(|v| field_text(v) == *expected)
            })
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One request received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// In-memory transport for tests.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
    closed: AtomicBool,
}

impl MockTransport {
    /// Creates a mock with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, when: &[(&str, &str)], reply: Reply) {
        let route = Route {
            method,
            path: path.to_string(),
            when: when
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            reply,
        };
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(route);
        }
    }

    /// Answers every GET of `path`.
    pub fn add_get(&self, path: &str, response: Response) {
        self.push(Method::Get, path, &[], Reply::Respond(response));
    }

    /// Answers GETs of `path` whose parameters match `when`.
    pub fn add_get_when(&self, path: &str, when: &[(&str, &str)], response: Response) {
        self.push(Method::Get, path, when, Reply::Respond(response));
    }

    /// Answers every POST to `path`.
    pub fn add_post(&self, path: &str, response: Response) {
        self.push(Method::Post, path, &[], Reply::Respond(response));
    }

    /// Answers POSTs to `path` whose body fields match `when`.
    pub fn add_post_when(&self, path: &str, when: &[(&str, &str)], response: Response) {
        self.push(Method::Post, path, when, Reply::Respond(response));
    }

    /// Makes GETs of `path` fail at the transport level.
    pub fn fail_get(&self, path: &str, message: &str) {
        self.push(Method::Get, path, &[], Reply::Fail(message.to_string()));
    }

    /// Makes POSTs to `path` matching `when` fail at the transport level.
    pub fn fail_post_when(&self, path: &str, when: &[(&str, &str)], message: &str) {
        self.push(Method::Post, path, when, Reply::Fail(message.to_string()));
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of requests made to `path`.
    pub fn call_count(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    /// Body of the most recent request to `path`.
    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| c.path == path)
            .and_then(|c| c.body)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response, TransportError> {
        if self.is_closed() {
            return Err(TransportError::new("session is closed"));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                method,
                path: path.to_string(),
                params: params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                body: body.cloned(),
            });
        }

        let routes = self
            .routes
            .lock()
            .map_err(|_| TransportError::new("route table poisoned"))?;
        // Conditional routes win over catch-all ones for the same path.
        let route = routes
            .iter()
            .rev()
            .filter(|r| !r.when.is_empty())
            .chain(routes.iter().rev().filter(|r| r.when.is_empty()))
            .find(|r| r.matches(method, path, params, body));

        match route.map(|r| &r.reply) {
            Some(Reply::Respond(response)) => Ok(response.clone()),
            Some(Reply::Fail(message)) => Err(TransportError::new(message.clone())),
            None => Ok(Response::new(
                404,
                json!({"message": format!("{} {} not found", method, path)}),
            )),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_is_not_found() {
        let mock = MockTransport::new();
        let response = mock.get("/nowhere", &[]).unwrap();
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_conditional_route_preferred() {
        let mock = MockTransport::new();
        mock.add_post("/stats", Response::ok(json!({"which": "any"})));
        mock.add_post_when("/stats", &[("hostId", "h2")], Response::ok(json!({"which": "h2"})));

        let h1 = mock.post("/stats", &json!({"hostId": "h1"})).unwrap();
        let h2 = mock.post("/stats", &json!({"hostId": "h2"})).unwrap();
        assert_eq!(h1.body["which"], "any");
        assert_eq!(h2.body["which"], "h2");
    }

    #[test]
    fn test_param_matching() {
        let mock = MockTransport::new();
        mock.add_get_when("/ports", &[("iscsi_target", "true")], Response::ok(json!({"n": 1})));
        let hit = mock.get("/ports", &[("iscsi_target", "true".to_string())]).unwrap();
        let miss = mock.get("/ports", &[]).unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(miss.status, 404);
    }

    #[test]
    fn test_numeric_body_field_matching() {
        let mock = MockTransport::new();
        mock.add_post_when("/rdf", &[("rdfsGroupId", "1")], Response::ok(json!({})));
        assert_eq!(mock.post("/rdf", &json!({"rdfsGroupId": 1})).unwrap().status, 200);
    }

    #[test]
    fn test_closed_transport_rejects_requests() {
        let mock = MockTransport::new();
        mock.add_get("/version", Response::ok(json!({"version": "V10.0.0.1"})));
        mock.close();
        assert!(mock.get("/version", &[]).is_err());
        assert!(mock.is_closed());
    }

    #[test]
    fn test_call_log() {
        let mock = MockTransport::new();
        mock.get("/a", &[("x", "1".to_string())]).unwrap();
        mock.post("/b", &json!({"k": "v"})).unwrap();
        assert_eq!(mock.calls().len(), 2);
        assert_eq!(mock.call_count("/a"), 1);
        assert_eq!(mock.last_body("/b"), Some(json!({"k": "v"})));
    }
}
