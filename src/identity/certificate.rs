//! Certificate field extraction for the identity view

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::types::{GatewayError, Result};

/// OID of the enrollment attribute extension (JSON `{"attrs": {...}}`)
pub const ATTRIBUTES_OID: &str = "1.2.3.4.5.6.7.8.1";

/// Fields of an enrollment certificate, as returned by the identity view
#[derive(Debug, Clone, Serialize)]
pub struct CertificateFields {
    pub subject: String,
    pub common_name: Option<String>,
    pub issuer: String,
    pub serial: String,
    pub not_before: String,
    pub not_after: String,
    pub alt_names: Vec<String>,
    /// SHA-256 over the DER encoding, hex
    pub fingerprint: String,
    /// Enrollment attributes embedded by the certificate authority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
}

impl CertificateFields {
    /// Parse a PEM-encoded certificate
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
            .map_err(|e| GatewayError::Certificate(format!("Invalid PEM: {}", e)))?;
        Self::from_der(&pem.contents)
    }

    /// Parse a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| GatewayError::Certificate(format!("Invalid X.509: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_string);

        let mut alt_names = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => alt_names.push(dns.to_string()),
                    GeneralName::RFC822Name(email) => alt_names.push(email.to_string()),
                    GeneralName::URI(uri) => alt_names.push(uri.to_string()),
                    _ => {}
                }
            }
        }

        let attributes = cert
            .extensions()
            .iter()
            .find(|ext| ext.oid.to_id_string() == ATTRIBUTES_OID)
            .and_then(|ext| serde_json::from_slice(ext.value).ok());

        Ok(Self {
            subject: cert.subject().to_string(),
            common_name,
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            not_before: format_time(cert.validity().not_before.timestamp()),
            not_after: format_time(cert.validity().not_after.timestamp()),
            alt_names,
            fingerprint: hex::encode(Sha256::digest(der)),
            attributes,
        })
    }
}

fn format_time(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_generated_certificate() {
        let certified =
            rcgen::generate_simple_self_signed(vec!["peer0.org1.example.com".to_string()]).unwrap();
        let pem = certified.cert.pem();

        let fields = CertificateFields::from_pem(&pem).unwrap();
        assert_eq!(fields.alt_names, vec!["peer0.org1.example.com".to_string()]);
        assert_eq!(fields.fingerprint.len(), 64);
        assert!(fields.not_before.ends_with('Z'));
        assert!(fields.attributes.is_none());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            CertificateFields::from_pem("not a certificate"),
            Err(GatewayError::Certificate(_))
        ));
        assert!(CertificateFields::from_der(&[0x30, 0x01]).is_err());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "1970-01-01T00:00:00Z");
    }
}
