//! HTTP front end.
//!
//! A fixed pool of handler threads shares one listener; each thread blocks
//! in `recv` and serves requests straight from the coordinator.  The wire
//! surface, kept compatible with existing clients:
//!
//! | Method | Path          | Response                                            |
//! |--------|---------------|-----------------------------------------------------|
//! | GET    | `/key?key=K`  | 200 `{"key":K,"value":V}` or `{"key":K,"error":..}` |
//! | POST   | `/key`        | 201 on create; 400 bad JSON; 411 missing length     |
//! | DELETE | `/key/K`      | 200; 400 if no key in the path                      |
//!
//! Input errors are answered here and never reach the coordinator; a store
//! error on read-through answers 500.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Deserialize;
use serde_json::json;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, error, info};

use crate::coordinator::Coordinator;
use crate::db::session::KvSession;
use crate::error::{Error, Result};

#[derive(Deserialize)]
struct PutBody {
    key: String,
    value: String,
}

// ---------------------------------------------------------------------------
// FrontEnd
// ---------------------------------------------------------------------------

/// The running HTTP server and its handler threads.
pub struct FrontEnd {
    server: Arc<Server>,
    handlers: Vec<JoinHandle<()>>,
}

impl FrontEnd {
    /// Binds `addr` and spawns `handler_threads` threads serving requests
    /// against `coordinator`.  Returns once the listener is live.
    pub fn bind<S: KvSession>(
        addr: &str,
        handler_threads: usize,
        coordinator: Arc<Coordinator<S>>,
    ) -> Result<Self> {
        assert!(handler_threads > 0, "need at least one handler thread");
        let server =
            Arc::new(Server::http(addr).map_err(|e| Error::Http(e.to_string()))?);
        info!(%addr, handler_threads, "HTTP front end listening");

        let handlers = (0..handler_threads)
            .map(|i| {
                let server = Arc::clone(&server);
                let coordinator = Arc::clone(&coordinator);
                thread::Builder::new()
                    .name(format!("handler-{i}"))
                    .spawn(move || {
                        // recv() fails once the listener is unblocked.
                        while let Ok(request) = server.recv() {
                            handle(request, &coordinator);
                        }
                    })
                    .expect("failed to spawn handler thread")
            })
            .collect();

        Ok(FrontEnd { server, handlers })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Unblocks the listener and joins every handler thread.
    pub fn shutdown(self) {
        self.server.unblock();
        for handler in self.handlers {
            let _ = handler.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

fn handle<S: KvSession>(mut request: Request, coordinator: &Coordinator<S>) {
    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url.as_str(), None),
    };
    let method = request.method().clone();

    let (status, body) = match (method, path) {
        (Method::Get, "/key") => get_key(query, coordinator),
        (Method::Post, "/key") => post_key(&mut request, coordinator),
        (Method::Delete, p) if p.starts_with("/key") => delete_key(p, coordinator),
        _ => (404, json!({"status": "error", "message": "not found"})),
    };

    respond_json(request, status, body);
}

fn get_key<S: KvSession>(
    query: Option<&str>,
    coordinator: &Coordinator<S>,
) -> (u16, serde_json::Value) {
    let Some(key) = query.and_then(|q| query_param(q, "key")) else {
        return (200, json!({"error": "No 'key' parameter was provided."}));
    };

    match coordinator.get(key) {
        Ok(Some(value)) => (
            200,
            json!({"key": key, "value": String::from_utf8_lossy(&value)}),
        ),
        Ok(None) => (200, json!({"key": key, "error": "Key not found"})),
        Err(e) => {
            error!(key, error = %e, "read-through lookup failed");
            (500, json!({"status": "error", "message": "store lookup failed"}))
        }
    }
}

fn post_key<S: KvSession>(
    request: &mut Request,
    coordinator: &Coordinator<S>,
) -> (u16, serde_json::Value) {
    let length = match request.body_length() {
        Some(n) if n > 0 => n,
        _ => {
            return (
                411,
                json!({"status": "error", "message": "Content-Length header is missing or invalid."}),
            )
        }
    };

    let bad_json = || {
        (
            400,
            json!({"status": "error", "message": "Invalid JSON format"}),
        )
    };
    let mut body = String::with_capacity(length);
    if request
        .as_reader()
        .take(length as u64)
        .read_to_string(&mut body)
        .is_err()
    {
        return bad_json();
    }
    let Ok(parsed) = serde_json::from_str::<PutBody>(&body) else {
        return bad_json();
    };

    let created_key = parsed.key.clone();
    coordinator.put(parsed.key, parsed.value.into_bytes());
    (201, json!({"status": "ok", "created_key": created_key}))
}

fn delete_key<S: KvSession>(path: &str, coordinator: &Coordinator<S>) -> (u16, serde_json::Value) {
    let Some(key) = path.strip_prefix("/key/").filter(|k| !k.is_empty()) else {
        return (
            400,
            json!({"status": "error", "message": "No key specified in path"}),
        );
    };

    coordinator.delete(key);
    (200, json!({"status": "ok", "deleted_key": key}))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then_some(v)
    })
}

fn respond_json(request: Request, status: u16, body: serde_json::Value) {
    let response = Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(
            Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("static header is valid"),
        );
    if let Err(e) = request.respond(response) {
        debug!(error = %e, "client went away before the response was written");
    }
}

#[cfg(test)]
mod tests {
    use super::query_param;

    #[test]
    fn query_param_finds_key_among_pairs() {
        assert_eq!(query_param("a=1&key=k1&b=2", "key"), Some("k1"));
        assert_eq!(query_param("key=", "key"), Some(""));
        assert_eq!(query_param("a=1&b=2", "key"), None);
    }
}
