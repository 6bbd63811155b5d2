//! In-process stand-ins for Airtable and the Graph API

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use warp::Filter;
use warp::http::StatusCode;
use warp::path::FullPath;

/// A request as seen by the fake upstream
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

/// A local HTTP server answering every POST with the same status and JSON body
pub struct FakeUpstream {
    pub url: String,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeUpstream {
    pub async fn start(status: StatusCode, reply: serde_json::Value) -> Self {
        let recorded = Arc::new(Mutex::new(vec!()));
        let recorder = recorded.clone();

        let route = warp::post()
            .and(warp::path::full())
            .and(warp::query::raw().or(warp::any().map(String::new)).unify())
            .and(warp::header::optional::<String>("authorization"))
            .and(warp::body::json())
            .map(move |path: FullPath, query: String, authorization: Option<String>, body: serde_json::Value| {
                recorder.lock().unwrap().push(Recorded {
                    path: path.as_str().to_string(),
                    query,
                    authorization,
                    body,
                });
                warp::reply::with_status(warp::reply::json(&reply), status)
            });

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self { url: format!("http://{}", addr), recorded }
    }

    /// Everything received so far
    pub fn requests(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }
}

/// A URL nothing listens on
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
