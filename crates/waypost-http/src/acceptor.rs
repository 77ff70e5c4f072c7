//! Bridges the custom client-cert-requiring rustls config (see `tls`) into
//! `axum_server`'s `Accept` trait, extracting the peer DN after handshake
//! and inserting it into every request on that connection as an extension.

use axum_server::accept::Accept;
use http::Request;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tower::Service;

use crate::extract::PeerDn;

#[derive(Clone)]
pub struct MtlsAcceptor {
    inner: TlsAcceptor,
}

impl MtlsAcceptor {
    pub fn new(config: Arc<rustls::ServerConfig>) -> Self {
        Self {
            inner: TlsAcceptor::from(config),
        }
    }
}

impl<S> Accept<TcpStream, S> for MtlsAcceptor
where
    S: Send + 'static,
{
    type Stream = TlsStream<TcpStream>;
    type Service = WithPeerDn<S>;
    type Future = Pin<Box<dyn Future<Output = std::io::Result<(Self::Stream, Self::Service)>> + Send>>;

    fn accept(&self, stream: TcpStream, service: S) -> Self::Future {
        let acceptor = self.inner.clone();
        Box::pin(async move {
            let tls_stream = acceptor.accept(stream).await?;

            let dn = {
                let (_, conn) = tls_stream.get_ref();
                conn.peer_certificates()
                    .and_then(|certs| certs.first())
                    .and_then(|cert| waypost_core::dn::effective_dn(cert.as_ref()).ok())
            };

            Ok((
                tls_stream,
                WithPeerDn {
                    inner: service,
                    dn: PeerDn(dn.map(Arc::from)),
                },
            ))
        })
    }
}

/// Wraps a per-connection service so every request carries the DN extracted
/// from that connection's client certificate.
#[derive(Clone)]
pub struct WithPeerDn<S> {
    inner: S,
    dn: PeerDn,
}

impl<S, ReqBody> Service<Request<ReqBody>> for WithPeerDn<S>
where
    S: Service<Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        req.extensions_mut().insert(self.dn.clone());
        self.inner.call(req)
    }
}
