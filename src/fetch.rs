//! Bounded, cancellable HTTPS fetch coordinator.
//!
//! Requests queue behind a dispatcher thread that admits at most
//! `max_requests` transfers at a time onto a single-threaded network
//! runtime. Exactly one of the two callbacks fires per request.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::concurrency::Guarded;
use crate::config::SETTINGS;

pub type SuccessFn = Box<dyn FnOnce(Vec<u8>) + Send + 'static>;
pub type ErrorFn = Box<dyn FnOnce(FetchError) + Send + 'static>;

#[derive(Debug)]
pub enum FetchError {
    /// The request was drained by a cancellation before completing.
    Cancelled,
    /// The server answered with a non-OK status.
    Status(u16),
    /// Connection, TLS, timeout or body transfer failure.
    Transport(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Cancelled => write!(f, "request cancelled"),
            FetchError::Status(code) => write!(f, "unexpected status {}", code),
            FetchError::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

struct FetchJob {
    domain: String,
    path: String,
    on_success: SuccessFn,
    on_error: ErrorFn,
}

struct FetchShared {
    // None is the cancellation sentinel.
    queue: Guarded<VecDeque<Option<FetchJob>>>,
    pending: Guarded<u32>,
    max_requests: u32,
}

pub struct Fetcher {
    shared: Arc<FetchShared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    // Keeps the network executor alive for the spawned transfers.
    _runtime: tokio::runtime::Runtime,
}

impl Fetcher {
    pub fn new(max_requests: u32, timeout_secs: u64) -> Fetcher {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("network")
            .enable_all()
            .build()
            .expect("cannot build network runtime");

        let client = reqwest::Client::builder()
            .gzip(true)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("cannot build HTTPS client");

        let shared = Arc::new(FetchShared {
            queue: Guarded::new(VecDeque::new()),
            pending: Guarded::new(0),
            max_requests,
        });

        let dispatcher = {
            let shared = Arc::clone(&shared);
            let handle = runtime.handle().clone();
            thread::Builder::new()
                .name("fetch-dispatch".to_owned())
                .spawn(move || dispatch_loop(shared, handle, client))
                .expect("cannot spawn dispatcher thread")
        };

        Fetcher {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
            _runtime: runtime,
        }
    }

    /// Queue a GET of `https://{domain}{path}`.
    pub fn get(&self, domain: &str, path: &str, on_success: SuccessFn, on_error: ErrorFn) {
        self.shared.queue.apply(|q| {
            q.push_back(Some(FetchJob {
                domain: domain.to_owned(),
                path: path.to_owned(),
                on_success,
                on_error,
            }))
        });
        self.shared.queue.notify_one();
    }

    /// Requests currently admitted past the dispatcher gate.
    pub fn pending(&self) -> u32 {
        self.shared.pending.get()
    }

    /// Stop accepting work: queued-but-not-started requests get their error
    /// callback synchronously, then in-flight transfers are drained.
    pub fn cancel(&self) {
        info!("pushing cancel signal");
        let mut queue: VecDeque<Option<FetchJob>> = VecDeque::new();
        queue.push_back(None);
        self.shared.queue.swap(&mut queue);
        self.shared.queue.notify_all();

        for job in queue.into_iter().flatten() {
            (job.on_error)(FetchError::Cancelled);
        }

        info!("waiting for pending count");
        self.shared.pending.wait(|&count| count == 0);
    }

    pub fn shutdown(&self) {
        self.cancel();
        if let Some(dispatcher) = self.dispatcher.lock().unwrap().take() {
            let _ = dispatcher.join();
        }
    }
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(shared: Arc<FetchShared>, handle: tokio::runtime::Handle, client: reqwest::Client) {
    loop {
        shared.queue.wait(|q| !q.is_empty());

        let job = match shared.queue.apply(|q| q.pop_front()) {
            Some(Some(job)) => job,
            Some(None) => {
                info!("aborting new requests");
                break;
            }
            None => continue,
        };

        // Wait for some requests to finish.
        shared.pending.wait(|&count| count < shared.max_requests);
        shared.pending.apply(|count| {
            *count += 1;
            debug!("pending count = {}", count);
        });

        let shared = Arc::clone(&shared);
        let client = client.clone();
        handle.spawn(async move {
            let result = fetch_once(&client, &job.domain, &job.path).await;

            shared.pending.apply(|count| {
                *count -= 1;
                debug!("pending count = {}", count);
            });
            shared.pending.notify_one();

            match result {
                Ok(body) => (job.on_success)(body),
                Err(e) => {
                    warn!("fetch failed for {}: {}", job.path, e);
                    (job.on_error)(e)
                }
            }
        });
    }
}

async fn fetch_once(client: &reqwest::Client, domain: &str, path: &str) -> Result<Vec<u8>, FetchError> {
    let url = format!("https://{}{}", domain, path);
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(FetchError::Status(response.status().as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    Ok(body.to_vec())
}

lazy_static::lazy_static! {
    static ref FETCHER: Arc<Fetcher> =
        Arc::new(Fetcher::new(SETTINGS.max_requests, SETTINGS.timeout_secs));
}

/// Process-wide fetch coordinator, constructed at first use from the
/// configured limits.
pub fn fetcher() -> Arc<Fetcher> {
    Arc::clone(&FETCHER)
}
