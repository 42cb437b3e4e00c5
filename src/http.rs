//! HTTP client and polled HTTP server.
//!
//! The client is a blocking `ureq` agent that reads whole response bodies.
//! The server answers every request with one configurable static response
//! and queues a copy of each request for the caller to poll; when the queue
//! is full the oldest request is dropped.

use std::collections::VecDeque;
use std::io::Read;
use std::os::raw::{c_char, c_int};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::bytes::Bytes;
use crate::error::{Error, Result};
use crate::ffi::{
    self, contract, raw, FatBytes, FatError, FatHttpClient, FatHttpRequest, FatHttpResponse,
    FatHttpServer, FatString,
};
use crate::string::new_string;
use crate::types::{options, Status};

/// Ordered header list with case-insensitive lookup of the first value.
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn check_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| Error::syntax(format!("parse {:?}: unsupported protocol scheme", url)))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(Error::syntax(format!("parse {:?}: missing host", url)));
    }
    Ok(())
}

/// A response with its body read in full.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    fn read(resp: ureq::Response) -> Result<Self> {
        let status = resp.status();
        let headers = resp
            .headers_names()
            .into_iter()
            .filter_map(|name| {
                let value = resp.header(&name)?.to_string();
                Some((name, value))
            })
            .collect();
        let mut body = Vec::new();
        resp.into_reader().read_to_end(&mut body)?;
        Ok(Self {
            status,
            headers: Headers(headers),
            body,
        })
    }
}

/// Blocking HTTP client.
pub struct Client {
    agent: ureq::Agent,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new().timeout(options().http_timeout).build();
        Self { agent }
    }

    fn finish(
        url: &str,
        result: std::result::Result<ureq::Response, ureq::Error>,
    ) -> Result<Response> {
        match result {
            Ok(resp) | Err(ureq::Error::Status(_, resp)) => Response::read(resp),
            Err(ureq::Error::Transport(t)) => match t.kind() {
                ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                    Err(Error::syntax(format!("parse {:?}: {}", url, t)))
                }
                _ => Err(Error::Network(t.to_string())),
            },
        }
    }

    pub fn get(&self, url: &str) -> Result<Response> {
        check_url(url)?;
        tracing::debug!(%url, "http get");
        Self::finish(url, self.agent.get(url).call())
    }

    /// POST `body`; an empty content type sends no `Content-Type` header.
    pub fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<Response> {
        check_url(url)?;
        tracing::debug!(%url, len = body.len(), "http post");
        let mut req = self.agent.post(url);
        if !content_type.is_empty() {
            req = req.set("Content-Type", content_type);
        }
        Self::finish(url, req.send_bytes(body))
    }
}

/// A request received by a [`Server`].
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
struct StaticResponse {
    status: u16,
    body: Vec<u8>,
    content_type: String,
}

struct Shared {
    queue: Mutex<VecDeque<Request>>,
    ready: Condvar,
    capacity: usize,
    response: RwLock<StaticResponse>,
    closed: AtomicBool,
}

impl Shared {
    fn enqueue(&self, req: Request) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                tracing::warn!(
                    method = %dropped.method,
                    path = %dropped.path,
                    "request queue full, dropping oldest"
                );
            }
        }
        queue.push_back(req);
        self.ready.notify_one();
    }
}

/// Background HTTP server answering with a static response.
pub struct Server {
    inner: Arc<tiny_http::Server>,
    addr: String,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    pub fn bind(addr: &str) -> Result<Self> {
        let target = crate::net::resolve(addr, true)?;
        let inner = tiny_http::Server::http(target.as_slice())
            .map_err(|e| Error::Network(format!("listen tcp {}: {}", addr, e)))?;
        let inner = Arc::new(inner);
        let addr = inner
            .server_addr()
            .to_ip()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            capacity: options().http_queue,
            response: RwLock::new(StaticResponse {
                status: 200,
                body: Vec::new(),
                content_type: String::new(),
            }),
            closed: AtomicBool::new(false),
        });
        let worker = {
            let inner = Arc::clone(&inner);
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("fatstd-http".to_string())
                .spawn(move || serve(&inner, &shared))?
        };
        tracing::info!(%addr, "http server listening");
        Ok(Self {
            inner,
            addr,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn set_static_response(&self, status: u16, body: Vec<u8>, content_type: String) {
        *self.shared.response.write() = StaticResponse {
            status,
            body,
            content_type,
        };
    }

    /// Wait for a queued request. `None` waits forever, a zero duration
    /// only polls.
    pub fn next_request(&self, timeout: Option<Duration>) -> Option<Request> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = self.shared.queue.lock();
        loop {
            if let Some(req) = queue.pop_front() {
                return Some(req);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            match deadline {
                None => self.shared.ready.wait(&mut queue),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    self.shared.ready.wait_until(&mut queue, deadline);
                }
            }
        }
    }

    /// Stop accepting requests and wake any waiting poller.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.unblock();
        self.shared.ready.notify_all();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        tracing::info!(addr = %self.addr, "http server closed");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}

fn serve(server: &tiny_http::Server, shared: &Shared) {
    while !shared.closed.load(Ordering::Acquire) {
        let mut incoming = match server.recv() {
            Ok(req) => req,
            Err(e) => {
                tracing::debug!(error = %e, "http accept stopped");
                break;
            }
        };
        let mut body = Vec::new();
        if let Err(e) = incoming.as_reader().read_to_end(&mut body) {
            tracing::warn!(error = %e, "reading request body failed");
        }
        let url = incoming.url();
        let path = url.split('?').next().unwrap_or(url).to_string();
        let headers = incoming
            .headers()
            .iter()
            .map(|h| (h.field.as_str().to_string(), h.value.as_str().to_string()))
            .collect();
        shared.enqueue(Request {
            method: incoming.method().to_string(),
            path,
            headers: Headers(headers),
            body,
        });

        let resp = shared.response.read().clone();
        let mut out = tiny_http::Response::from_data(resp.body).with_status_code(resp.status);
        if !resp.content_type.is_empty() {
            let content_type = resp.content_type.as_bytes();
            if let Ok(h) = tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type) {
                out = out.with_header(h);
            }
        }
        if let Err(e) = incoming.respond(out) {
            tracing::debug!(error = %e, "writing response failed");
        }
    }
}

unsafe fn header_value(op: &str, headers: &Headers, name: *const c_char) -> FatString {
    let name = raw::cstr_text(op, name, "name");
    new_string(headers.get(&name).unwrap_or_default())
}

unsafe fn response_export(
    op: &str,
    out_resp: *mut FatHttpResponse,
    out_err: *mut FatError,
    call: impl FnOnce() -> Result<Response>,
) -> Status {
    let out_err = ffi::out_err(op, out_err);
    let out_resp = raw::out(op, out_resp, "out_resp");
    *out_resp = FatHttpResponse::invalid();
    ffi::complete(op, out_err, call(), |resp| *out_resp = FatHttpResponse::register(resp))
}

/// Creates a client using the configured round-trip timeout.
#[no_mangle]
pub extern "C" fn fat_HttpClientNew() -> FatHttpClient {
    FatHttpClient::register(Client::new())
}

/// Releases the client.
#[no_mangle]
pub extern "C" fn fat_HttpClientFree(c: FatHttpClient) {
    c.release("fat_HttpClientFree");
}

/// Issues a GET. Only `http://` URLs are accepted; others are `SYNTAX`.
///
/// # Safety
///
/// `url` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_HttpClientGetUTF8(
    c: FatHttpClient,
    url: *const c_char,
    out_resp: *mut FatHttpResponse,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_HttpClientGetUTF8";
    let client = c.resolve(OP);
    let url = raw::cstr_text(OP, url, "url");
    response_export(OP, out_resp, out_err, || client.get(&url))
}

/// Issues a POST with `body`. `content_type` may be NULL.
///
/// # Safety
///
/// `url` must be NUL-terminated, `content_type` NUL-terminated or NULL;
/// out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_HttpClientPostBytesUTF8(
    c: FatHttpClient,
    url: *const c_char,
    content_type: *const c_char,
    body: FatBytes,
    out_resp: *mut FatHttpResponse,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_HttpClientPostBytesUTF8";
    let client = c.resolve(OP);
    let url = raw::cstr_text(OP, url, "url");
    let content_type = if content_type.is_null() {
        String::new()
    } else {
        raw::cstr_text(OP, content_type, "content_type").into_owned()
    };
    let body = body.resolve(OP);
    response_export(OP, out_resp, out_err, || client.post(&url, &content_type, body.as_slice()))
}

/// HTTP status code.
#[no_mangle]
pub extern "C" fn fat_HttpResponseStatus(r: FatHttpResponse) -> c_int {
    c_int::from(r.resolve("fat_HttpResponseStatus").status)
}

/// Copy of the response body.
#[no_mangle]
pub extern "C" fn fat_HttpResponseBody(r: FatHttpResponse) -> FatBytes {
    FatBytes::register(Bytes::new(r.resolve("fat_HttpResponseBody").body.clone()))
}

/// First value of header `name`, or "" if absent.
///
/// # Safety
///
/// `name` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn fat_HttpResponseHeaderGetUTF8(
    r: FatHttpResponse,
    name: *const c_char,
) -> FatString {
    const OP: &str = "fat_HttpResponseHeaderGetUTF8";
    header_value(OP, &r.resolve(OP).headers, name)
}

/// Releases the response.
#[no_mangle]
pub extern "C" fn fat_HttpResponseFree(r: FatHttpResponse) {
    r.release("fat_HttpResponseFree");
}

/// # Safety
///
/// `addr` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_HttpServerNewUTF8(
    addr: *const c_char,
    out_server: *mut FatHttpServer,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_HttpServerNewUTF8";
    let out_err = ffi::out_err(OP, out_err);
    let out_server = raw::out(OP, out_server, "out_server");
    *out_server = FatHttpServer::invalid();
    let addr = raw::cstr_text(OP, addr, "addr");
    ffi::complete(OP, out_err, Server::bind(&addr), |s| *out_server = FatHttpServer::register(s))
}

/// Bound address as `host:port`.
#[no_mangle]
pub extern "C" fn fat_HttpServerAddr(s: FatHttpServer) -> FatString {
    new_string(s.resolve("fat_HttpServerAddr").addr())
}

/// Sets the response sent to every later request. A status outside
/// 100..=999 is fatal.
///
/// # Safety
///
/// `content_type` must be NUL-terminated or NULL.
#[no_mangle]
pub unsafe extern "C" fn fat_HttpServerSetStaticResponse(
    s: FatHttpServer,
    status: c_int,
    body: FatBytes,
    content_type: *const c_char,
) {
    const OP: &str = "fat_HttpServerSetStaticResponse";
    contract::require(OP, (100..=999).contains(&status), "status code out of range");
    let body = body.resolve(OP).as_slice().to_vec();
    let content_type = if content_type.is_null() {
        String::new()
    } else {
        raw::cstr_text(OP, content_type, "content_type").into_owned()
    };
    s.resolve(OP).set_static_response(status as u16, body, content_type);
}

/// Takes the next queued request. A negative timeout waits forever, 0
/// polls. `*out_req` stays 0 when nothing arrived in time.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_HttpServerNextRequest(
    s: FatHttpServer,
    timeout_ms: i64,
    out_req: *mut FatHttpRequest,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_HttpServerNextRequest";
    let out_err = ffi::out_err(OP, out_err);
    let out_req = raw::out(OP, out_req, "out_req");
    *out_req = FatHttpRequest::invalid();
    let timeout = u64::try_from(timeout_ms).ok().map(Duration::from_millis);
    let server = s.resolve(OP);
    let req = server.next_request(timeout);
    ffi::complete(OP, out_err, Ok(req), |req| {
        if let Some(req) = req {
            *out_req = FatHttpRequest::register(req);
        }
    })
}

/// Request method, such as `GET`.
#[no_mangle]
pub extern "C" fn fat_HttpRequestMethod(r: FatHttpRequest) -> FatString {
    new_string(r.resolve("fat_HttpRequestMethod").method.as_str())
}

/// Request path without the query string.
#[no_mangle]
pub extern "C" fn fat_HttpRequestPath(r: FatHttpRequest) -> FatString {
    new_string(r.resolve("fat_HttpRequestPath").path.as_str())
}

/// Copy of the request body.
#[no_mangle]
pub extern "C" fn fat_HttpRequestBody(r: FatHttpRequest) -> FatBytes {
    FatBytes::register(Bytes::new(r.resolve("fat_HttpRequestBody").body.clone()))
}

/// # Safety
///
/// `name` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn fat_HttpRequestHeaderGetUTF8(
    r: FatHttpRequest,
    name: *const c_char,
) -> FatString {
    const OP: &str = "fat_HttpRequestHeaderGetUTF8";
    header_value(OP, &r.resolve(OP).headers, name)
}

/// Releases the request.
#[no_mangle]
pub extern "C" fn fat_HttpRequestFree(r: FatHttpRequest) {
    r.release("fat_HttpRequestFree");
}

/// Stops the server and releases the handle.
///
/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_HttpServerClose(s: FatHttpServer, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_HttpServerClose";
    let out_err = ffi::out_err(OP, out_err);
    s.release(OP).close();
    ffi::complete(OP, out_err, Ok(()), |()| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_url() {
        assert!(check_url("http://127.0.0.1:80/x").is_ok());
        assert_eq!(check_url("https://example.com").unwrap_err().status(), Status::Syntax);
        assert_eq!(check_url("http:///path").unwrap_err().status(), Status::Syntax);
        assert_eq!(check_url("not a url").unwrap_err().status(), Status::Syntax);
    }

    #[test]
    fn test_headers_lookup_is_case_insensitive() {
        let h = Headers(vec![
            ("Content-Type".into(), "a".into()),
            ("content-type".into(), "b".into()),
        ]);
        assert_eq!(h.get("CONTENT-TYPE"), Some("a"));
        assert_eq!(h.get("X-Missing"), None);
    }

    #[test]
    fn test_poll_on_empty_queue() {
        let server = Server::bind("127.0.0.1:0").unwrap();
        assert!(server.next_request(Some(Duration::ZERO)).is_none());
        let start = Instant::now();
        assert!(server.next_request(Some(Duration::from_millis(30))).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
        server.close();
        assert!(server.next_request(None).is_none());
    }

    #[test]
    fn test_round_trip_through_static_server() {
        let server = Server::bind("127.0.0.1:0").unwrap();
        server.set_static_response(201, b"created".to_vec(), "text/plain".into());
        let url = format!("http://{}/items?x=1", server.addr());

        let client = Client::new();
        let resp = client.post(&url, "application/json", b"{\"a\":1}").unwrap();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body, b"created");
        assert_eq!(resp.headers.get("content-type"), Some("text/plain"));

        let req = server.next_request(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/items");
        assert_eq!(req.body, b"{\"a\":1}");
        assert_eq!(req.headers.get("Content-Type"), Some("application/json"));
        server.close();
    }

    #[test]
    fn test_queue_drops_oldest() {
        let shared = Shared {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            capacity: 2,
            response: RwLock::new(StaticResponse {
                status: 200,
                body: Vec::new(),
                content_type: String::new(),
            }),
            closed: AtomicBool::new(false),
        };
        for path in ["/1", "/2", "/3"] {
            shared.enqueue(Request {
                method: "GET".into(),
                path: path.into(),
                headers: Headers::default(),
                body: Vec::new(),
            });
        }
        let paths: Vec<_> = shared.queue.lock().iter().map(|r| r.path.clone()).collect();
        assert_eq!(paths, ["/2", "/3"]);
    }
}
