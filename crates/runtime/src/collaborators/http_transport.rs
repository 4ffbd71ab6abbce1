//! HTTP transport collaborator (spec §6 "HTTP transport").
//!
//! Grounded on the teacher runtime's `http_client.rs`: a `ureq::AgentBuilder`
//! with a fixed timeout and a capped response body, `ureq::Error` split
//! into `Status` (still a response, just non-2xx) and `Transport`
//! (connection never completed). `ureq` is a blocking client, so the real
//! transport below never actually suspends — `connect`/`send`/`receive`
//! always resolve on the same call. The suspension path they return
//! through still matters: it is what lets a test double simulate a host
//! whose I/O genuinely spans two VM polls (spec §8 property 7).

use std::collections::HashMap;
use std::io::Read as _;
use std::path::Path;
use std::time::Duration;

use ureq::{Agent, AgentBuilder};

/// Best-effort write used by `receive`'s `to_file`/`to_dump` destinations;
/// a write failure doesn't fail the round trip (original source treats
/// both as side-channel outputs, not the call's primary result).
fn write_bytes(path: &Path, bytes: &[u8]) -> bool {
    use crate::collaborators::filesystem::FileHandle;
    FileHandle::open_write(path, false).and_then(|mut f| f.write_all(bytes)).is_ok()
}

pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Either the call finished this poll, or the host must call `continue`
/// and re-enter with the same arguments (spec §4.4).
pub enum TransportPoll<T> {
    Ready(T),
    Pending,
}

/// Outcome of a full connect/send/receive round trip (spec §4.4's
/// built-in-level suspension, one layer above the per-step
/// `TransportPoll`).
pub enum HttpPoll {
    Pending,
    Ready(Result<HttpResponse, String>),
}

pub trait HttpTransport: Send {
    fn init(&mut self, user_agent: &str);
    fn connect(&mut self, site: &str) -> TransportPoll<()>;
    fn send(&mut self, url: &str, post_body: Option<&[u8]>) -> TransportPoll<()>;
    /// `to_file`/`to_dump` are caller-supplied paths the raw (pre-`normalise`)
    /// body is written to as a side effect (spec §6 "Collaborator
    /// contracts": `receive(to_file, to_dump, normalise)`); either or both
    /// may be absent.
    fn receive(&mut self, to_file: Option<&Path>, to_dump: Option<&Path>, normalise: bool) -> TransportPoll<Result<HttpResponse, String>>;
    fn get_status(&self) -> u16;
    fn get_header(&self, name: &str) -> Option<String>;
    fn set_header(&mut self, name: &str, value: &str);
    fn close_request(&mut self);
    fn disconnect(&mut self);
    fn shutdown(&mut self);
}

/// The real, blocking transport used outside tests.
pub struct UreqHttpTransport {
    agent: Agent,
    headers: HashMap<String, String>,
    max_body_bytes: usize,
    site: Option<String>,
    last: Option<HttpResponse>,
}

impl UreqHttpTransport {
    pub fn new(timeout_secs: u64, max_body_bytes: usize) -> Self {
        let agent = AgentBuilder::new().timeout(Duration::from_secs(timeout_secs)).build();
        UreqHttpTransport { agent, headers: HashMap::new(), max_body_bytes, site: None, last: None }
    }

    fn run(&mut self, method: &str, url: &str, body: Option<&[u8]>) -> Result<HttpResponse, String> {
        let mut req = self.agent.request(method, url);
        for (k, v) in &self.headers {
            req = req.set(k, v);
        }
        let resp = match body {
            Some(b) => req.send_bytes(b),
            None => req.call(),
        };
        let resp = match resp {
            Ok(r) => r,
            Err(ureq::Error::Status(_, r)) => r,
            Err(ureq::Error::Transport(t)) => return Err(t.to_string()),
        };
        let status = resp.status();
        let mut headers = HashMap::new();
        for name in resp.headers_names() {
            if let Some(v) = resp.header(&name) {
                headers.insert(name.to_lowercase(), v.to_string());
            }
        }
        let mut body = Vec::new();
        resp.into_reader().take(self.max_body_bytes as u64).read_to_end(&mut body).map_err(|e| e.to_string())?;
        Ok(HttpResponse { status, headers, body })
    }
}

impl HttpTransport for UreqHttpTransport {
    fn init(&mut self, user_agent: &str) {
        self.headers.insert("user-agent".to_string(), user_agent.to_string());
    }

    fn connect(&mut self, site: &str) -> TransportPoll<()> {
        self.site = Some(site.to_string());
        TransportPoll::Ready(())
    }

    fn send(&mut self, url: &str, post_body: Option<&[u8]>) -> TransportPoll<()> {
        let method = if post_body.is_some() { "POST" } else { "GET" };
        match self.run(method, url, post_body) {
            Ok(r) => self.last = Some(r),
            Err(e) => self.last = Some(HttpResponse { status: 0, headers: HashMap::new(), body: e.into_bytes() }),
        }
        TransportPoll::Ready(())
    }

    fn receive(&mut self, to_file: Option<&Path>, to_dump: Option<&Path>, normalise: bool) -> TransportPoll<Result<HttpResponse, String>> {
        match self.last.take() {
            Some(r) if r.status == 0 => TransportPoll::Ready(Err(String::from_utf8_lossy(&r.body).into_owned())),
            Some(mut r) => {
                // `to_dump` is a best-effort side channel: a write failure
                // there doesn't fail the call. `to_file` is the primary
                // destination for the `*_to_file` built-ins, so a failure
                // there is surfaced like any other transport error.
                if let Some(path) = to_dump {
                    write_bytes(path, &r.body);
                }
                if let Some(path) = to_file {
                    if !write_bytes(path, &r.body) {
                        return TransportPoll::Ready(Err(format!("failed to write response to {}", path.display())));
                    }
                }
                if normalise {
                    let text = crate::collaborators::html_normalizer::normalise(&String::from_utf8_lossy(&r.body));
                    r.body = text.into_bytes();
                }
                TransportPoll::Ready(Ok(r))
            }
            None => TransportPoll::Ready(Err("receive called with no pending request".to_string())),
        }
    }

    fn get_status(&self) -> u16 {
        self.last.as_ref().map(|r| r.status).unwrap_or(0)
    }

    fn get_header(&self, name: &str) -> Option<String> {
        self.last.as_ref().and_then(|r| r.headers.get(&name.to_lowercase()).cloned())
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_lowercase(), value.to_string());
    }

    fn close_request(&mut self) {
        self.last = None;
    }

    fn disconnect(&mut self) {
        self.site = None;
    }

    fn shutdown(&mut self) {
        self.headers.clear();
        self.site = None;
        self.last = None;
    }
}

#[cfg(test)]
pub mod stub {
    use super::*;

    /// A scripted transport for exercising the suspension/resume path
    /// without a network: each call consumes one entry from `script`,
    /// `Pending` entries require a second poll before the next action
    /// proceeds.
    pub struct ScriptedHttpTransport {
        pub connect_polls: usize,
        pub response: Result<HttpResponse, String>,
    }

    impl ScriptedHttpTransport {
        pub fn pending_once(status: u16, body: &str) -> Self {
            ScriptedHttpTransport {
                connect_polls: 1,
                response: Ok(HttpResponse { status, headers: HashMap::new(), body: body.as_bytes().to_vec() }),
            }
        }
    }

    impl HttpTransport for ScriptedHttpTransport {
        fn init(&mut self, _user_agent: &str) {}

        fn connect(&mut self, _site: &str) -> TransportPoll<()> {
            if self.connect_polls > 0 {
                self.connect_polls -= 1;
                TransportPoll::Pending
            } else {
                TransportPoll::Ready(())
            }
        }

        fn send(&mut self, _url: &str, _post_body: Option<&[u8]>) -> TransportPoll<()> {
            TransportPoll::Ready(())
        }

        fn receive(&mut self, _to_file: Option<&Path>, _to_dump: Option<&Path>, _normalise: bool) -> TransportPoll<Result<HttpResponse, String>> {
            let r = match &self.response {
                Ok(r) => Ok(HttpResponse { status: r.status, headers: r.headers.clone(), body: r.body.clone() }),
                Err(e) => Err(e.clone()),
            };
            TransportPoll::Ready(r)
        }

        fn get_status(&self) -> u16 {
            self.response.as_ref().map(|r| r.status).unwrap_or(0)
        }

        fn get_header(&self, _name: &str) -> Option<String> {
            None
        }

        fn set_header(&mut self, _name: &str, _value: &str) {}
        fn close_request(&mut self) {}
        fn disconnect(&mut self) {}
        fn shutdown(&mut self) {}
    }
}
