#![allow(dead_code, clippy::unwrap_used)]

//! In-process fake of the Combined Energy upstream.
//!
//! Every path has a queue of scripted replies consumed in order and an
//! optional default reply used once the queue is empty. Every request is
//! journaled with its query and body so tests can assert on ordering.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use combined_energy::CombinedEnergyClient;
use combined_energy::config::Config;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const LOGIN: &str = "/user/Login";
pub const INSTALLATION: &str = "/dataAccess/installation";
pub const LOG_SESSION: &str = "/mqtt2/user/LogSessionStart";
pub const READINGS: &str = "/dataAccess/readings";
pub const TARIFF: &str = "/dataAccess/tariff-details";

pub const LOGIN_JSON: &str = include_str!("../fixtures/login.json");
pub const LOG_SESSION_JSON: &str = include_str!("../fixtures/log-session.json");
pub const INSTALLATION_JSON: &str = include_str!("../fixtures/installation.json");
pub const READINGS_JSON: &str = include_str!("../fixtures/readings.json");
pub const TARIFF_JSON: &str = include_str!("../fixtures/tariff-details.json");

pub fn fixture(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

/// One request as the fake saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

type Responder = Arc<dyn Fn(&Recorded) -> (u16, Value) + Send + Sync>;

#[derive(Clone)]
pub struct Reply {
    respond: Responder,
    delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self::with(move |_| (status, body.clone()))
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn status(status: u16) -> Self {
        Self::json(status, json!({"status": "error"}))
    }

    pub fn with(respond: impl Fn(&Recorded) -> (u16, Value) + Send + Sync + 'static) -> Self {
        Self {
            respond: Arc::new(respond),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Shared {
    queues: Mutex<HashMap<String, VecDeque<Reply>>>,
    defaults: Mutex<HashMap<String, Reply>>,
    journal: Mutex<Vec<Recorded>>,
}

pub struct FakeUpstream {
    shared: Arc<Shared>,
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

async fn handle(
    State(shared): State<Arc<Shared>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let query = uri
        .query()
        .map(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let recorded = Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        query,
        body: serde_json::from_slice(&body).ok(),
    };
    shared.journal.lock().unwrap().push(recorded.clone());

    let reply = {
        let scripted = shared
            .queues
            .lock()
            .unwrap()
            .get_mut(&recorded.path)
            .and_then(VecDeque::pop_front);
        scripted.or_else(|| shared.defaults.lock().unwrap().get(&recorded.path).cloned())
    };

    let Some(reply) = reply else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let (status, body) = (reply.respond)(&recorded);
    let status = StatusCode::from_u16(status).unwrap();
    (status, Json(body)).into_response()
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let shared = Arc::new(Shared::default());
        let app = Router::new().fallback(handle).with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let server = axum::serve(listener, app);
            tokio::select! {
                _ = server => {},
                _ = shutdown_rx => {},
            }
        });

        Self {
            shared,
            addr,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Fake with login, installation, log session, readings and tariff answering from fixtures
    pub async fn with_defaults() -> Self {
        let upstream = Self::start().await;
        upstream.set_default(LOGIN, Reply::ok(fixture(LOGIN_JSON)));
        upstream.set_default(INSTALLATION, Reply::ok(fixture(INSTALLATION_JSON)));
        upstream.set_default(LOG_SESSION, Reply::ok(fixture(LOG_SESSION_JSON)));
        upstream.set_default(READINGS, echo_readings(3));
        upstream.set_default(TARIFF, Reply::ok(fixture(TARIFF_JSON)));
        upstream
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a one-shot reply for `path`
    pub fn push(&self, path: &str, reply: Reply) {
        self.shared
            .queues
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Reply used for `path` once its queue is empty
    pub fn set_default(&self, path: &str, reply: Reply) {
        self.shared
            .defaults
            .lock()
            .unwrap()
            .insert(path.to_string(), reply);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.shared.journal.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    /// Config pointing every endpoint at this fake, with millisecond backoff
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.account.identity = "me@example.com".to_string();
        config.account.password = "secret".to_string();
        config.endpoints.user_access = self.url();
        config.endpoints.data_access = self.url();
        config.endpoints.mqtt_access = self.url();
        config.http.timeout_secs = 5;
        config.http.retry.base_delay_ms = 1;
        config
    }

    pub fn client(&self) -> Arc<CombinedEnergyClient> {
        Arc::new(CombinedEnergyClient::new(&self.config()).unwrap())
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Readings window echoing the requested range, with `count` samples
pub fn readings_window(start: i64, end: i64, count: u32) -> Value {
    let timestamps: Vec<i64> = (0..i64::from(count)).map(|i| start + i * 5).collect();
    let energy: Vec<f64> = timestamps.iter().map(|_| 0.01).collect();
    let devices = if count == 0 {
        json!([])
    } else {
        json!([{
            "deviceId": 1,
            "deviceType": "GRID_METER",
            "timestamp": timestamps,
            "energyConsumed": energy
        }])
    };
    json!({
        "rangeStart": start,
        "rangeEnd": end,
        "rangeCount": count,
        "seconds": 5,
        "installationId": 1234,
        "serverTime": end,
        "devices": devices
    })
}

/// Readings reply whose window is exactly the requested range.
///
/// Without `rangeStart` the window starts one minute before `rangeEnd`.
pub fn echo_readings(count: u32) -> Reply {
    Reply::with(move |request| {
        let end: i64 = request
            .query
            .get("rangeEnd")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1_744_527_170);
        let start: i64 = request
            .query
            .get("rangeStart")
            .and_then(|v| v.parse().ok())
            .unwrap_or(end - 60);
        (200, readings_window(start, end, count))
    })
}
