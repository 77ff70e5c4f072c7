//! Outbound mutually-authenticated HTTPS clients, one per external
//! collaborator (stager, transfer-host agent, FTS), each presenting the
//! cert/key pair configured for its stage (spec §6 "Outbound HTTPS").

use waypost_core::error::{Result, WaypostError};

pub fn build_client(cert_path: &std::path::Path, key_path: &std::path::Path) -> Result<reqwest::Client> {
    let mut pem = std::fs::read(cert_path)?;
    let mut key = std::fs::read(key_path)?;
    pem.push(b'\n');
    pem.append(&mut key);

    let identity = reqwest::Identity::from_pem(&pem)
        .map_err(|e| WaypostError::InvalidConfig(format!("invalid client identity: {e}")))?;

    reqwest::Client::builder()
        .identity(identity)
        .use_rustls_tls()
        .build()
        .map_err(WaypostError::from)
}
