use std::fmt;

use bytes::Bytes;
use http::{header::HeaderName, HeaderValue, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use tokio::sync::{watch, Mutex};

use crate::common::data::ResponseRecord;
use crate::server::keys::{KeyProviderRegistry, KeySource, LiveRequest};
use crate::server::server::SHUTDOWN_GRACE;
use crate::server::state::TripStore;

/// Header carrying the diagnostic string of a failed identity computation.
const ERROR_HEADER: &str = "error";

/// Serves the next recorded response for each inbound request's identity.
pub struct ReplayHandler {
    registry: KeyProviderRegistry,
    index_keys: Vec<String>,
    store: Mutex<TripStore>,
    shutdown: watch::Sender<bool>,
    print_access_log: bool,
}

impl ReplayHandler {
    pub fn new(
        registry: KeyProviderRegistry,
        index_keys: Vec<String>,
        store: TripStore,
        shutdown: watch::Sender<bool>,
        print_access_log: bool,
    ) -> Self {
        ReplayHandler {
            registry,
            index_keys,
            store: Mutex::new(store),
            shutdown,
            print_access_log,
        }
    }

    pub async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = match LiveRequest::materialize(req).await {
            Ok(live) => self.replay(&live).await,
            Err(e) => error_response(&e),
        };

        if self.print_access_log {
            tracing::info!("{} {} -> {}", method, path, response.status().as_u16());
        }
        response
    }

    pub(crate) async fn replay(&self, live: &LiveRequest) -> Response<Full<Bytes>> {
        let identity = match self
            .registry
            .build_identity(&self.index_keys, &KeySource::Live(live))
        {
            Ok(identity) => identity,
            Err(e) => return error_response(&e),
        };

        let (response, drained) = {
            // One guard covers lookup, peek, advance and the emptiness
            // check, so concurrent requests with the same identity always
            // consume distinct sequential responses.
            let mut store = self.store.lock().await;
            let Some(record) = store.next(&identity).cloned() else {
                tracing::info!(
                    "no recorded trip for identity {}, available: [{}]",
                    identity,
                    store.identities().join(",")
                );
                return not_found();
            };
            match recorded_response(&record) {
                Ok(response) => {
                    // Advance only once the response could be built, so a
                    // corrupt record does not consume a trip.
                    store.advance(&identity);
                    (response, store.is_empty())
                }
                Err(e) => return error_response(&e),
            }
        };

        if drained {
            self.schedule_shutdown();
        }
        response
    }

    /// Begins the drain sequence: after a grace delay for in-flight writes
    /// the listener is told to close. The store lock is not held while the
    /// delay runs; late requests still get handled and receive 404.
    fn schedule_shutdown(&self) {
        tracing::info!("all recorded trips have been served, shutting down");
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            let _ = shutdown.send(true);
        });
    }
}

/// Rebuilds a recorded response verbatim: status, every recorded header,
/// and the body when non-empty.
fn recorded_response(record: &ResponseRecord) -> Result<Response<Full<Bytes>>, http::Error> {
    let mut builder = Response::builder().status(record.status);
    for (name, values) in &record.headers {
        for value in values.iter() {
            builder = builder.header(name.as_str(), value);
        }
    }
    builder.body(Full::new(Bytes::from(record.body.clone())))
}

fn not_found() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn error_response(error: &dyn fmt::Display) -> Response<Full<Bytes>> {
    let diagnostic = error.to_string().replace(['\r', '\n'], " ");
    let value = HeaderValue::from_str(&diagnostic)
        .unwrap_or_else(|_| HeaderValue::from_static("identity computation failed"));

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(HeaderName::from_static(ERROR_HEADER), value);
    response
}
