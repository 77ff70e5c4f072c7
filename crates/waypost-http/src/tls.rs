//! Mutual-TLS listener setup (spec §4.7): the server requires a client
//! certificate but does not validate its chain against a fixed root store —
//! the original source's `ALLOW_PROXY_CERTS` trust store flag meant any
//! self-issued proxy certificate terminates the handshake successfully, and
//! the real authorization decision is the DN allow-list/configured-DN match
//! done at the application layer (spec §4.7, `check_auth` in the original).
//! This verifier mirrors that: it requires *a* certificate be presented, and
//! defers all trust decisions to the DN extracted from it.

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::ServerConfig as RustlsServerConfig;
use rustls::{DigitallySignedStruct, DistinguishedName, Error as TlsError, SignatureScheme};
use std::sync::Arc;
use waypost_core::error::{Result, WaypostError};

#[derive(Debug)]
struct AnyClientCertVerifier {
    provider: Arc<CryptoProvider>,
}

impl ClientCertVerifier for AnyClientCertVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, TlsError> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Build the server-side rustls config: present `cert_path`/`key_path`,
/// require (but not chain-validate) a client certificate.
pub fn load_server_tls_config(
    cert_path: &std::path::Path,
    key_path: &std::path::Path,
) -> Result<RustlsServerConfig> {
    let cert_file =
        std::fs::File::open(cert_path).map_err(|e| WaypostError::InvalidConfig(format!("cert: {e}")))?;
    let mut cert_reader = std::io::BufReader::new(cert_file);
    let cert_chain: Vec<_> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| WaypostError::InvalidConfig(format!("failed to parse server certificate: {e}")))?;

    let key_file =
        std::fs::File::open(key_path).map_err(|e| WaypostError::InvalidConfig(format!("key: {e}")))?;
    let mut key_reader = std::io::BufReader::new(key_file);
    let key = rustls_pemfile::pkcs8_private_keys(&mut key_reader)
        .next()
        .ok_or_else(|| WaypostError::InvalidConfig("no private key found".to_string()))?
        .map_err(|e| WaypostError::InvalidConfig(format!("failed to parse server key: {e}")))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(AnyClientCertVerifier { provider });

    let config = RustlsServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key.into())
        .map_err(|e| WaypostError::InvalidConfig(format!("failed to build TLS config: {e}")))?;

    Ok(config)
}
