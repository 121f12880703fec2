//! Development server with per-language routing and live reload
//!
//! Provides an HTTP server that:
//! - Serves translation bundles straight from the registry
//! - Strips language prefixes from HTML requests and renders templates for the active language
//! - Serves the `virtual:locale-bundles` module
//! - Sends Server-Sent Events (SSE) when the active language's translations change

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode, Uri},
    response::{
        sse::{Event, KeepAlive},
        Html, IntoResponse, Response, Sse,
    },
    routing::get,
    Router,
};
use locale_bundler::{
    config::BundlerConfig,
    html::HtmlMultiplexer,
    notifier::{ReloadNotifier, ServerNotification},
    router::{is_html_request, RequestRouter, RouteDecision},
    state::SharedState,
    virtual_module::{VirtualModuleResolver, RESOLVED_VIRTUAL_MODULE_ID, VIRTUAL_MODULE_URL},
    BundlerError,
};
use std::{
    convert::Infallible,
    net::SocketAddr,
    path::{Component, Path, PathBuf},
    time::Duration,
};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tower::ServiceExt;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub const LIVE_RELOAD_SCRIPT: &str = r#"
<script>
(function() {
    'use strict';

    const eventSource = new EventSource('/events');

    eventSource.addEventListener('reload', function(e) {
        console.log('[locale-bundler] Translations changed, reloading...');
        window.location.reload();
    });

    eventSource.addEventListener('close', function(e) {
        console.log('[locale-bundler] Server shutting down, closing connection...');
        eventSource.close();
    });

    eventSource.addEventListener('error', function(e) {
        if (e.target.readyState === EventSource.CLOSED) {
            console.log('[locale-bundler] Connection closed');
        } else if (e.target.readyState === EventSource.CONNECTING) {
            console.log('[locale-bundler] Reconnecting...');
        }
    });

    window.addEventListener('beforeunload', function() {
        eventSource.close();
    });
})();
</script>"#;

/// Shared state for the dev server
#[derive(Clone)]
struct DevServerState {
    notify_tx: broadcast::Sender<ServerNotification>,
    router: RequestRouter,
    multiplexer: HtmlMultiplexer,
    resolver: VirtualModuleResolver,
    root: PathBuf,
}

pub struct DevServer {
    notifier: ReloadNotifier,
    state: DevServerState,
    port: u16,
}

impl DevServer {
    pub fn new(
        config: &BundlerConfig,
        state: SharedState,
        notifier: ReloadNotifier,
        port: u16,
    ) -> Result<Self, BundlerError> {
        let server_state = DevServerState {
            notify_tx: notifier.sender(),
            router: RequestRouter::new(state.clone(), config.server.active_language),
            multiplexer: HtmlMultiplexer::from_config(state.clone(), config)?,
            resolver: VirtualModuleResolver::new(state),
            root: config.server.root.clone(),
        };
        Ok(DevServer {
            notifier,
            state: server_state,
            port,
        })
    }

    /// Start the dev server (blocking until shutdown signal)
    pub async fn serve(
        self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let root = self.state.root.clone();

        let app = Router::new()
            .route("/events", get(sse_handler))
            .fallback(fallback_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state);

        tracing::info!("Dev server starting on http://{}", addr);
        println!("\nDev server running at http://{}", addr);
        println!("Serving: {}", root.display());
        println!("Live reload enabled for the active language\n");

        let listener = tokio::net::TcpListener::bind(addr).await?;

        // Wrap shutdown signal to send notification to SSE clients before shutdown
        let notifier = self.notifier;
        let wrapped_shutdown = async move {
            shutdown_signal.await;
            // Sent twice: the first produces the close event, the second ends the stream
            notifier.shutdown();
            tokio::time::sleep(Duration::from_millis(50)).await;
            notifier.shutdown();
            tokio::time::sleep(Duration::from_millis(200)).await;
        };

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(wrapped_shutdown)
            .await?;

        tracing::info!("Dev server shut down");
        Ok(())
    }
}

/// SSE endpoint handler
async fn sse_handler(
    State(state): State<DevServerState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notify_tx.subscribe();
    let stream = BroadcastStream::new(rx);

    let mut saw_shutdown = false;
    let stream = stream.filter_map(move |result| match result {
        Ok(ServerNotification::Reload { .. }) => {
            Some(Ok(Event::default().event("reload").data("reload")))
        }
        Ok(ServerNotification::Shutdown) => {
            // Send explicit close event to browser, then close stream on next poll
            if !saw_shutdown {
                saw_shutdown = true;
                Some(Ok(Event::default()
                    .event("close")
                    .data("Server shutting down")))
            } else {
                None
            }
        }
        // Lagged behind, reload anyway
        Err(_) => Some(Ok(Event::default().event("reload").data("reload"))),
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn virtual_module_response(state: &DevServerState) -> Response {
    match state.resolver.load(RESOLVED_VIRTUAL_MODULE_ID) {
        Some(source) => ([(header::CONTENT_TYPE, "application/javascript")], source).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn fallback_handler(State(state): State<DevServerState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    // Matched by hand: the router would read the colon as a path parameter
    if path == VIRTUAL_MODULE_URL {
        return virtual_module_response(&state);
    }
    match state.router.route(&path) {
        RouteDecision::ServeBundle { content, .. } => {
            ([(header::CONTENT_TYPE, "application/json")], content).into_response()
        }
        RouteDecision::Forward { path, .. } | RouteDecision::PassThrough { path } => {
            serve_path(&state, &path, request).await
        }
    }
}

/// `/` → `index.html`, `/about` → `about/index.html`. `None` if the path leaves the root.
fn html_file(root: &Path, path: &str) -> Option<PathBuf> {
    let relative = Path::new(path.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    if path.ends_with(".html") {
        Some(root.join(relative))
    } else {
        Some(root.join(relative).join("index.html"))
    }
}

fn inject_live_reload(html: &str) -> String {
    match html.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], LIVE_RELOAD_SCRIPT, &html[idx..]),
        None => format!("{html}{LIVE_RELOAD_SCRIPT}"),
    }
}

async fn serve_path(state: &DevServerState, path: &str, mut request: Request) -> Response {
    if is_html_request(path) {
        if let Some(file) = html_file(&state.root, path) {
            if let Ok(template) = tokio::fs::read_to_string(&file).await {
                return match state.multiplexer.render_primary(&template, path) {
                    Ok(html) => Html(inject_live_reload(&html)).into_response(),
                    Err(e) => {
                        tracing::error!("[DevServer] Could not render {:?}: {}", file, e);
                        (e.status_code(), e.to_string()).into_response()
                    }
                };
            }
        }
    }

    match path.parse::<Uri>() {
        Ok(uri) => *request.uri_mut() = uri,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
    match ServeDir::new(&state.root).oneshot(request).await {
        Ok(response) => response.map(Body::new).into_response(),
        Err(e) => match e {},
    }
}
