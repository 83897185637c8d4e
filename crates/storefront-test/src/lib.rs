//! Helpers for testing the CMS client.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`CmsServer`], make sure that the server is held until all requests to
//!    the server have been made. The server stops serving when dropped. To avoid this,
//!    assign it to a variable: `let server = CmsServer::with_catalog();`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{self, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the storefront crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new(
            "storefront_cache=trace,storefront_service=trace",
        ))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Returns the absolute path to the given fixture.
///
/// Fixtures are located in the `tests/fixtures` directory, located from the workspace root.
///
/// # Panics
///
/// Panics if the fixture path does not exist on the file system.
pub fn fixture(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();

    let mut full_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    full_path.pop(); // to /crates/
    full_path.pop(); // to /
    full_path.push("./tests/fixtures/");
    full_path.push(path);

    assert!(full_path.exists(), "'{}' does not exist", path.display());

    full_path
}

/// Returns the contents of a JSON fixture.
///
/// # Panics
///
/// Panics if the fixture does not exist or is not valid JSON.
pub fn read_json_fixture(path: impl AsRef<Path>) -> Value {
    let contents = std::fs::read(fixture(path)).unwrap();
    serde_json::from_slice(&contents).unwrap()
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Creates a new test server serving the given router.
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Default)]
struct Fixtures {
    /// Responses by API path, without the `/api/` prefix.
    responses: BTreeMap<String, (StatusCode, Value)>,
    /// Artificial latency of every response.
    delay: Duration,
}

type SharedFixtures = Arc<Mutex<Fixtures>>;

/// A fake CMS that serves canned JSON responses under `/api/` and counts every request.
pub struct CmsServer {
    server: Server,
    fixtures: SharedFixtures,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl CmsServer {
    /// Creates a server that responds with `404` to everything.
    pub fn new() -> Self {
        let fixtures = SharedFixtures::default();
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |req: extract::Request, next: Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        let hits = hits.entry(req.uri().to_string()).or_default();
                        *hits += 1;
                    }

                    next.run(req).await
                }
            }
        };

        let router = Router::new()
            .route("/api/*path", get(respond))
            .with_state(fixtures.clone())
            .layer(middleware::from_fn(hitcounter));

        let server = Server::with_router(router);

        Self {
            server,
            fixtures,
            hits,
        }
    }

    /// Creates a server with the catalog fixtures from `tests/fixtures/cms`.
    ///
    /// This serves `products`, `products/abc123`, `categories` and `global`.
    pub fn with_catalog() -> Self {
        let server = Self::new();
        server.respond("products", read_json_fixture("cms/products.json"));
        server.respond("products/abc123", read_json_fixture("cms/product_abc123.json"));
        server.respond("categories", read_json_fixture("cms/categories.json"));
        server.respond("global", read_json_fixture("cms/global.json"));
        server
    }

    /// Responds to `GET /api/{path}` with the given JSON body.
    pub fn respond(&self, path: &str, body: Value) {
        self.respond_with_status(path, 200, body);
    }

    /// Responds to `GET /api/{path}` with the given status code and JSON body.
    pub fn respond_with_status(&self, path: &str, status: u16, body: Value) {
        let status = StatusCode::from_u16(status).unwrap();
        self.fixtures
            .lock()
            .unwrap()
            .responses
            .insert(path.trim_matches('/').to_owned(), (status, body));
    }

    /// Delays every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.fixtures.lock().unwrap().delay = delay;
    }

    /// The base URL of the CMS, to be used as the client's base URL.
    pub fn base_url(&self) -> Url {
        self.server.url("/")
    }

    /// Returns and resets the total number of requests.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Returns and resets the number of requests per URI.
    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_iter().collect()
    }
}

impl Default for CmsServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn respond(
    State(fixtures): State<SharedFixtures>,
    extract::Path(path): extract::Path<String>,
) -> Response {
    let (delay, response) = {
        let fixtures = fixtures.lock().unwrap();
        (fixtures.delay, fixtures.responses.get(&path).cloned())
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match response {
        Some((status, body)) => (status, Json(body)).into_response(),
        None => {
            let body = json!({
                "data": null,
                "error": {"status": 404, "name": "NotFoundError", "message": "Not Found"}
            });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}
