//! Stub collaborators shared by the coordinator and manager tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kindly_core::Error;
use url::Url;

use crate::fetch::{FetchOptions, Fetcher, RawResponse};
use crate::ratelimit::RateLimiter;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Status { status: u16, headers: Vec<(String, String)>, body: String, redirected_to: Option<String> },
    Fail,
    Panic,
}

impl Reply {
    pub(crate) fn status(status: u16) -> Self {
        Reply::Status { status, headers: Vec::new(), body: String::new(), redirected_to: None }
    }

    pub(crate) fn ok(content_type: &str, body: &str) -> Self {
        Reply::Status {
            status: 200,
            headers: vec![("content-type".into(), content_type.into())],
            body: body.into(),
            redirected_to: None,
        }
    }

    pub(crate) fn html(body: &str) -> Self {
        Self::ok("text/html; charset=utf-8", body)
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        if let Reply::Status { headers, .. } = &mut self {
            headers.push((name.to_ascii_lowercase(), value.to_string()));
        }
        self
    }

    /// Report `target` as the URL the response finally came from.
    pub(crate) fn redirected_to(mut self, target: &str) -> Self {
        if let Reply::Status { redirected_to, .. } = &mut self {
            *redirected_to = Some(target.to_string());
        }
        self
    }
}

/// Serves canned replies by path. Unknown paths get a 404.
pub(crate) struct StubFetcher {
    routes: Mutex<HashMap<String, Reply>>,
    validators: Mutex<Vec<Option<String>>>,
    page_calls: AtomicUsize,
    robots_calls: AtomicUsize,
    delay: Duration,
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Page requests sleep for `delay` before replying.
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            validators: Mutex::new(Vec::new()),
            page_calls: AtomicUsize::new(0),
            robots_calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub(crate) fn route(&self, path: &str, reply: Reply) -> &Self {
        self.routes.lock().unwrap().insert(path.to_string(), reply);
        self
    }

    pub(crate) fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn robots_calls(&self) -> usize {
        self.robots_calls.load(Ordering::SeqCst)
    }

    /// Validators sent with each page request, in order.
    pub(crate) fn validators(&self) -> Vec<Option<String>> {
        self.validators.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<RawResponse, Error> {
        if url.path() == "/robots.txt" {
            self.robots_calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            self.validators.lock().unwrap().push(opts.validator.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(url.path())
            .cloned()
            .unwrap_or_else(|| Reply::status(404));

        match reply {
            Reply::Status { status, headers, body, redirected_to } => {
                let mut map: HashMap<String, Vec<String>> = HashMap::new();
                for (name, value) in headers {
                    map.entry(name).or_default().push(value);
                }
                let final_url = match redirected_to {
                    Some(target) => Url::parse(&target).map_err(|e| Error::InvalidUrl(e.to_string()))?,
                    None => url.clone(),
                };
                Ok(RawResponse { final_url, status, headers: map, body: Bytes::from(body), fetch_ms: 1 })
            }
            Reply::Fail => Err(Error::HttpError("network error: connection reset".into())),
            Reply::Panic => panic!("stub fetcher asked to panic"),
        }
    }
}

/// Never waits; records what it was told.
#[derive(Default)]
pub(crate) struct RecordingLimiter {
    pub(crate) acquired: AtomicUsize,
    pub(crate) delays: Mutex<Vec<Duration>>,
    pub(crate) closed: AtomicUsize,
}

#[async_trait]
impl RateLimiter for RecordingLimiter {
    async fn acquire(&self, _url: &Url) -> Result<(), Error> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update_delay(&self, _url: &Url, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }

    fn effective_delay(&self, _url: &Url) -> Duration {
        self.delays.lock().unwrap().last().copied().unwrap_or_default()
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
