//! Hyper host transport
//!
//! Accepts HTTP/1.1 connections, converts each hyper request into an
//! [`HttpRequest`], streams the body frames into an [`Exchange`] and turns
//! the resulting [`HttpResponse`] back into a hyper response. Pull bodies
//! are read chunk by chunk on the blocking pool.
//!
//! [`Exchange`]: crate::engine::Exchange

use anyhow::Context;
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::config::HestiaConfig;
use crate::engine::Engine;
use crate::http::{ContentReader, HttpMethod, HttpRequest, HttpResponse, ResponseBody, StatusCode};
use crate::resource::{CgiExecutor, StaticRoot, VirtualLink};

pub type RespBody = UnsyncBoxBody<Bytes, io::Error>;

/// Bytes handed to hyper per pull-body frame
const PULL_CHUNK: usize = 64 * 1024;

/// Hestia server: the engine behind a TCP listener
///
/// # Example
///
/// ```no_run
/// use hestia_core::config::HestiaConfig;
/// use hestia_core::resource::VirtualLink;
/// use hestia_core::server::HestiaServer;
///
/// # async fn run() -> anyhow::Result<()> {
/// HestiaServer::new(HestiaConfig::load()?)?
///     .with_link(VirtualLink::new("/hello", "text/plain", |_| Ok("hi".into())))
///     .serve()
///     .await
/// # }
/// ```
pub struct HestiaServer {
    engine: Arc<Engine>,
    address: String,
}

impl HestiaServer {
    pub fn new(config: HestiaConfig) -> anyhow::Result<Self> {
        let address = config.server.bind_address();
        Ok(Self { engine: Arc::new(Engine::new(config)?), address })
    }

    pub fn from_engine(engine: Arc<Engine>) -> Self {
        let address = engine.config().server.bind_address();
        Self { engine, address }
    }

    /// Override the configured listen address
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_link(self, link: VirtualLink) -> Self {
        self.engine.register_link(link);
        self
    }

    pub fn with_cgi(self, url: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        self.engine.cgi().register(url, script);
        self
    }

    pub fn with_cgi_executor(self, executor: Arc<dyn CgiExecutor>) -> Self {
        self.engine.cgi().set_executor(executor);
        self
    }

    /// Serve files from `root`, replacing the configured document root
    pub fn with_static_root(self, root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        let suffixes = self.engine.config().static_files.templated_suffixes.clone();
        let static_root = StaticRoot::new(&root, suffixes)
            .with_context(|| format!("Invalid document root {}", root.display()))?;
        self.engine.resolver().set_static_root(Some(static_root));
        Ok(self)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Serve until the process is killed
    pub async fn serve(self) -> anyhow::Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind {}", self.address))?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve_listener<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr().context("Listener has no local address")?;
        log::info!("Hestia listening on http://{}", local);

        let gc = spawn_gc(Arc::clone(&self.engine));
        let tls = self.engine.config().server.tls;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            log::warn!("Accept failed: {}", err);
                            continue;
                        }
                    };
                    let engine = Arc::clone(&self.engine);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            handle_request(Arc::clone(&engine), req, remote, tls)
                        });
                        if let Err(err) =
                            http1::Builder::new().serve_connection(TokioIo::new(stream), service).await
                        {
                            log::debug!("Connection from {} ended: {}", remote, err);
                        }
                    });
                }
                _ = &mut shutdown => {
                    log::info!("Hestia on {} shutting down", local);
                    break;
                }
            }
        }

        gc.abort();
        Ok(())
    }
}

fn spawn_gc(engine: Arc<Engine>) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_secs(engine.config().server.gc_interval.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            engine.collect_garbage();
        }
    })
}

async fn handle_request(
    engine: Arc<Engine>,
    req: Request<Incoming>,
    remote: SocketAddr,
    tls: bool,
) -> Result<Response<RespBody>, Infallible> {
    let (parts, mut body) = req.into_parts();

    let Ok(method) = parts.method.as_str().parse::<HttpMethod>() else {
        log::info!("Unsupported method {} from {}", parts.method, remote);
        return Ok(convert_response(HttpResponse::new(StatusCode::NotImplemented)));
    };
    let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut request = HttpRequest::new(method, target).remote(remote).secure(tls);
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => request.insert_header(name.as_str(), value),
            Err(_) => log::debug!("Dropping non-ASCII header {} from {}", name, remote),
        }
    }

    let mut exchange = engine.begin(request);
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    exchange.feed(&data);
                }
            }
            Err(err) => {
                exchange.abort(&err.to_string());
                break;
            }
        }
    }

    Ok(convert_response(exchange.respond()))
}

fn convert_response(response: HttpResponse) -> Response<RespBody> {
    let (status, headers, body) = response.into_parts();

    let mut builder = Response::builder().status(status.as_u16());
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let body: RespBody = match body {
        ResponseBody::Empty => Empty::new().map_err(|never| match never {}).boxed_unsync(),
        ResponseBody::Buffer(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
        ResponseBody::Pull(reader) => pull_body(reader),
    };

    builder.body(body).unwrap_or_else(|err| {
        log::error!("Invalid response: {}", err);
        let mut fallback = Response::new(Empty::new().map_err(|never| match never {}).boxed_unsync());
        *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// Stream a pull reader, one blocking read per frame
fn pull_body(reader: Box<dyn ContentReader>) -> RespBody {
    let frames = async_stream::stream! {
        let mut reader = Some(reader);
        let mut offset = 0u64;
        while let Some(current) = reader.take() {
            let read = tokio::task::spawn_blocking(move || {
                let mut current = current;
                let mut buf = vec![0u8; PULL_CHUNK];
                let result = current.read_at(offset, &mut buf).map(|n| {
                    buf.truncate(n);
                    buf
                });
                (current, result)
            })
            .await;

            match read {
                Ok((_, Ok(chunk))) if chunk.is_empty() => break,
                Ok((current, Ok(chunk))) => {
                    offset += chunk.len() as u64;
                    reader = Some(current);
                    yield Ok(Frame::data(Bytes::from(chunk)));
                }
                Ok((_, Err(err))) => {
                    log::warn!("Body read failed at offset {}: {}", offset, err);
                    yield Err(err);
                }
                Err(err) => yield Err(io::Error::other(err)),
            }
        }
    };
    StreamBody::new(frames).boxed_unsync()
}
