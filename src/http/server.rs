//! HTTP/2-capable server binding, optional TLS, and request body
//! accumulation over the scatter [`Buffer`]. See spec §4.9.
//!
//! Built on `hyper` 1.x + `hyper-util`'s protocol-sniffing `auto` connection
//! builder, so a single listener serves both cleartext HTTP/1.1 and h2
//! (negotiated via ALPN when TLS is enabled) the way the teacher's
//! `Http2Server` wraps a vendor HTTP/2 library behind one bind call.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{error, info, warn};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::concurrency::buffer::{BlockPool, Buffer, BLOCK_CAPACITY};

use super::router::{HandlerRequest, Router};

#[derive(Debug, Error)]
pub enum HttpServerError {
    #[error("TLS enabled but certificate file path is missing or empty")]
    InvalidCertPath,
    #[error("TLS enabled but private key file path is missing or empty")]
    InvalidKeyPath,
    #[error("failed to load TLS material: {0}")]
    TlsConfig(String),
    #[error("this binary was not built with the `tls` feature enabled")]
    TlsNotCompiled,
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
}

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub tls_certificate_file_path: Option<String>,
    pub tls_private_key_file_path: Option<String>,
}

/// Binds `host:port` and serves the given [`Router`] until the process is
/// killed or `run` returns an error. One [`BlockPool`] is shared by every
/// accepted connection's request-body buffer, so concurrent uploads recycle
/// the same pool of 64 KiB blocks rather than each allocating its own.
pub struct HttpServer {
    config: HttpServerConfig,
    router: Arc<Router>,
    block_pool: Arc<BlockPool>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, router: Arc<Router>) -> Self {
        Self {
            config,
            router,
            block_pool: Arc::new(BlockPool::new(BLOCK_CAPACITY)),
        }
    }

    pub async fn run(&self) -> Result<(), HttpServerError> {
        if self.config.use_tls {
            self.run_tls().await
        } else {
            self.run_plain().await
        }
    }

    async fn run_plain(&self) -> Result<(), HttpServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| HttpServerError::Bind(addr.clone(), e))?;
        info!("pbs http server listening on {addr} (cleartext)");
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };
            let router = self.router.clone();
            let pool = self.block_pool.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let router = router.clone();
                    let pool = pool.clone();
                    async move { serve_request(router, pool, req).await }
                });
                if let Err(e) = AutoBuilder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await
                {
                    warn!("connection error: {e}");
                }
            });
        }
    }

    #[cfg(feature = "tls")]
    async fn run_tls(&self) -> Result<(), HttpServerError> {
        let cert_path = self
            .config
            .tls_certificate_file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(HttpServerError::InvalidCertPath)?;
        let key_path = self
            .config
            .tls_private_key_file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(HttpServerError::InvalidKeyPath)?;
        let acceptor = tls::build_acceptor(cert_path, key_path)?;

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| HttpServerError::Bind(addr.clone(), e))?;
        info!("pbs http server listening on {addr} (tls)");
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };
            let acceptor = acceptor.clone();
            let router = self.router.clone();
            let pool = self.block_pool.clone();
            tokio::spawn(async move {
                let tls_stream = match acceptor.accept(stream).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("tls handshake failed: {e}");
                        return;
                    }
                };
                let io = TokioIo::new(tls_stream);
                let service = service_fn(move |req| {
                    let router = router.clone();
                    let pool = pool.clone();
                    async move { serve_request(router, pool, req).await }
                });
                if let Err(e) = AutoBuilder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await
                {
                    warn!("connection error: {e}");
                }
            });
        }
    }

    #[cfg(not(feature = "tls"))]
    async fn run_tls(&self) -> Result<(), HttpServerError> {
        Err(HttpServerError::TlsNotCompiled)
    }
}

/// Converts one hyper request into a [`HandlerRequest`], dispatches it
/// through the router, and converts the result back. Body bytes are
/// accumulated via [`Buffer`] frame-by-frame rather than hyper's own
/// contiguous-collect helper, so a large upload is never forced into one
/// allocation (spec §4.9).
async fn serve_request(
    router: Arc<Router>,
    pool: Arc<BlockPool>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let headers = req.headers().clone();

    let mut buffer = Buffer::new(pool);
    let mut body = req.into_body();
    loop {
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(chunk) = frame.data_ref() {
                    buffer.write_all(chunk);
                }
            }
            Some(Err(e)) => {
                error!("error reading request body: {e}");
                break;
            }
            None => break,
        }
    }

    let handler_request = HandlerRequest {
        method,
        path,
        headers,
        body: buffer.to_contiguous_vec(),
    };
    let handler_response = router.dispatch(handler_request).await;

    let mut builder = Response::builder().status(handler_response.status);
    for (name, value) in handler_response.headers {
        builder = builder.header(name, value);
    }
    let response = builder
        .body(Full::new(Bytes::from(handler_response.body)))
        .expect("status code and header values were validated by the handler");
    Ok(response)
}

#[cfg(feature = "tls")]
mod tls {
    use std::fs::File;
    use std::io::BufReader;
    use std::sync::Arc;

    use rustls::pki_types::{CertificateDer, PrivateKeyDer};
    use rustls_pemfile::{certs, pkcs8_private_keys};
    use tokio_rustls::TlsAcceptor;

    use super::HttpServerError;

    /// Loads a cert chain + PKCS#8 private key from disk and builds a
    /// `TlsAcceptor` offering h2 over ALPN (falling back to HTTP/1.1).
    pub fn build_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor, HttpServerError> {
        let cert_file =
            File::open(cert_path).map_err(|_| HttpServerError::InvalidCertPath)?;
        let cert_chain: Vec<CertificateDer<'static>> = certs(&mut BufReader::new(cert_file))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HttpServerError::TlsConfig(e.to_string()))?;
        if cert_chain.is_empty() {
            return Err(HttpServerError::InvalidCertPath);
        }

        let key_file = File::open(key_path).map_err(|_| HttpServerError::InvalidKeyPath)?;
        let mut keys: Vec<_> = pkcs8_private_keys(&mut BufReader::new(key_file))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HttpServerError::TlsConfig(e.to_string()))?;
        let key: PrivateKeyDer = keys
            .pop()
            .ok_or(HttpServerError::InvalidKeyPath)?
            .into();

        let mut server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(|e| HttpServerError::TlsConfig(e.to_string()))?;
        server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(TlsAcceptor::from(Arc::new(server_config)))
    }
}
