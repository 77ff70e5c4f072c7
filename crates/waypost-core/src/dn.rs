//! X.509 distinguished-name extraction, generalizing the proxy-certificate-aware
//! one-level walk used throughout the original stager/agent/FTS callback auth.

use crate::error::{Result, WaypostError};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

/// Format an x509-parser `X509Name` as `/K=V/K=V/...`, matching the original
/// `'/' + '/'.join('%s=%s' % (k, v) for k, v in components)` rendering.
fn format_dn(name: &x509_parser::x509::X509Name) -> String {
    let mut out = String::new();
    for rdn in name.iter() {
        for attr in rdn.iter() {
            let oid = attr.attr_type().to_id_string();
            let key = short_name(&oid).unwrap_or(oid);
            let value = attr.as_str().unwrap_or("").to_string();
            out.push('/');
            out.push_str(&key);
            out.push('=');
            out.push_str(&value);
        }
    }
    out
}

/// OIDs for the handful of attribute types that show up in grid/EUGridPMA DNs.
fn short_name(oid: &str) -> Option<String> {
    match oid {
        "2.5.4.3" => Some("CN".to_string()),
        "2.5.4.6" => Some("C".to_string()),
        "2.5.4.7" => Some("L".to_string()),
        "2.5.4.8" => Some("ST".to_string()),
        "2.5.4.10" => Some("O".to_string()),
        "2.5.4.11" => Some("OU".to_string()),
        "1.2.840.113549.1.9.1" => Some("emailAddress".to_string()),
        _ => None,
    }
}

/// Extract the effective DN of a DER-encoded peer certificate, per spec §4.7:
/// the issuer DN if a `proxyCertInfo` extension is present (one level only),
/// otherwise the subject DN.
pub fn effective_dn(peer_cert_der: &[u8]) -> Result<String> {
    let (_, cert) = X509Certificate::from_der(peer_cert_der)
        .map_err(|e| WaypostError::Certificate(format!("failed to parse peer certificate: {e}")))?;
    Ok(extract_dn(&cert))
}

fn extract_dn(cert: &X509Certificate<'_>) -> String {
    let has_proxy_cert_info = cert
        .extensions()
        .iter()
        .any(|ext| ext.oid.to_id_string() == PROXY_CERT_INFO_OID);

    if has_proxy_cert_info {
        format_dn(cert.issuer())
    } else {
        format_dn(cert.subject())
    }
}

/// id-pkix-pe-proxyCertInfo, RFC 3820 §3.8.
const PROXY_CERT_INFO_OID: &str = "1.3.6.1.5.5.7.1.14";

/// An allow-list of DNs permitted to reach a given route, loaded once at
/// startup and read-only thereafter (spec §5, "process-wide state").
#[derive(Debug, Clone, Default)]
pub struct DnAllowList {
    dns: Vec<String>,
}

impl DnAllowList {
    pub fn new(dns: Vec<String>) -> Self {
        Self { dns }
    }

    pub fn from_lines(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.dns.iter().any(|d| d == dn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_matches_exact_dn() {
        let allow = DnAllowList::from_lines("/O=Example/CN=alice\n/O=Example/CN=bob\n");
        assert!(allow.contains("/O=Example/CN=alice"));
        assert!(!allow.contains("/O=Evil/CN=mallory"));
    }

    #[test]
    fn allow_list_ignores_blank_lines() {
        let allow = DnAllowList::from_lines("\n/O=Example/CN=alice\n\n");
        assert_eq!(allow.dns.len(), 1);
    }
}
