//! End-to-end tests over a real socket: HTTP front end -> coordinator ->
//! cache / write-behind, backed by the in-memory store.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use cortado::db::{MemorySession, MemoryStore, SessionPool};
use cortado::digest::key_digest;
use cortado::http::FrontEnd;
use cortado::writeback::{TaskQueue, WriteBehind};
use cortado::{CacheBuilder, Coordinator};
use serde_json::Value;

struct Server {
    addr: SocketAddr,
    store: MemoryStore,
    queue: Arc<TaskQueue>,
    front: Option<FrontEnd>,
    workers: Option<WriteBehind>,
}

impl Server {
    fn start() -> Self {
        let store = MemoryStore::new();
        let pool = Arc::new(SessionPool::new(store.sessions(4)));
        let queue = Arc::new(TaskQueue::new());
        let workers = WriteBehind::spawn(Arc::clone(&queue), Arc::clone(&pool), 2);
        let cache = CacheBuilder::new(64).num_shards(4).build();
        let coordinator: Arc<Coordinator<MemorySession>> =
            Arc::new(Coordinator::new(cache, pool, Arc::clone(&queue)));
        let front = FrontEnd::bind("127.0.0.1:0", 2, coordinator).unwrap();
        let addr = front.local_addr().expect("front end bound a TCP address");
        Server {
            addr,
            store,
            queue,
            front: Some(front),
            workers: Some(workers),
        }
    }

    /// Sends a raw HTTP/1.1 request and returns `(status, parsed body)`.
    fn send(&self, raw: String) -> (u16, Value) {
        let mut stream = TcpStream::connect(self.addr).unwrap();
        stream.write_all(raw.as_bytes()).unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        let status: u16 = response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| panic!("malformed status line in: {response}"));
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, b)| b)
            .unwrap_or("");
        let json = serde_json::from_str(body)
            .unwrap_or_else(|_| panic!("non-JSON body: {body:?}"));
        (status, json)
    }

    fn get(&self, query: &str) -> (u16, Value) {
        self.send(format!(
            "GET /key{query} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        ))
    }

    fn post(&self, body: &str) -> (u16, Value) {
        self.send(format!(
            "POST /key HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ))
    }

    fn delete(&self, path: &str) -> (u16, Value) {
        self.send(format!(
            "DELETE {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        ))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(front) = self.front.take() {
            front.shutdown();
        }
        if let Some(workers) = self.workers.take() {
            workers.shutdown();
        }
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn create_then_read() {
    let server = Server::start();

    let (status, body) = server.post(r#"{"key":"k1","value":"v1"}"#);
    assert_eq!(status, 201);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["created_key"], "k1");

    let (status, body) = server.get("?key=k1");
    assert_eq!(status, 200);
    assert_eq!(body["key"], "k1");
    assert_eq!(body["value"], "v1");
}

#[test]
fn read_miss_reports_key_not_found() {
    let server = Server::start();

    let (status, body) = server.get("?key=nonexistent_xyz");
    assert_eq!(status, 200);
    assert_eq!(body["error"], "Key not found");
    assert!(body.get("value").is_none());
}

#[test]
fn delete_then_read_and_store_row_is_gone() {
    let server = Server::start();

    server.post(r#"{"key":"k2","value":"v2"}"#);
    // Let the upsert commit first: same-key ordering across workers is
    // unspecified, and this scenario is about the delete winning the end
    // state, not about racing it against the insert.
    server.queue.wait_drained();
    let (status, body) = server.delete("/key/k2");
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = server.get("?key=k2");
    assert_eq!(status, 200);
    assert_eq!(body["error"], "Key not found");

    server.queue.wait_drained();
    assert!(!server.store.contains(&key_digest("k2")));
}

#[test]
fn update_returns_the_new_value() {
    let server = Server::start();

    server.post(r#"{"key":"k3","value":"v_old"}"#);
    server.post(r#"{"key":"k3","value":"v_new"}"#);

    let (_, body) = server.get("?key=k3");
    assert_eq!(body["value"], "v_new");
}

#[test]
fn read_through_from_a_prepopulated_store() {
    let server = Server::start();
    server.store.seed(key_digest("k4"), "k4", b"v4");

    let (_, body) = server.get("?key=k4");
    assert_eq!(body["value"], "v4");
    assert_eq!(server.store.lookup_count(), 1);

    // Served from the cache now: no further store lookups.
    let (_, body) = server.get("?key=k4");
    assert_eq!(body["value"], "v4");
    assert_eq!(server.store.lookup_count(), 1);
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

#[test]
fn invalid_json_is_rejected_with_400() {
    let server = Server::start();

    let (status, body) = server.post(r#"{"key": "k1", "value""#);
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Invalid JSON format");

    let (status, _) = server.post(r#"{"wrong_field":"k1"}"#);
    assert_eq!(status, 400);
}

#[test]
fn missing_content_length_is_rejected_with_411() {
    let server = Server::start();

    let (status, _) = server.send(
        "POST /key HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
    );
    assert_eq!(status, 411);
}

#[test]
fn get_without_key_parameter_reports_an_error() {
    let server = Server::start();

    let (status, body) = server.get("");
    assert_eq!(status, 200);
    assert_eq!(body["error"], "No 'key' parameter was provided.");
}

#[test]
fn delete_without_key_in_path_is_rejected_with_400() {
    let server = Server::start();

    let (status, _) = server.delete("/key");
    assert_eq!(status, 400);
    let (status, _) = server.delete("/key/");
    assert_eq!(status, 400);
}

#[test]
fn unknown_route_is_404() {
    let server = Server::start();

    let (status, _) = server.send(
        "GET /definitely-not-a-route HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
            .to_string(),
    );
    assert_eq!(status, 404);
}
