// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! TLS certificate probe
//!
//! Performs a verified handshake against the webpki root set and reads the
//! leaf certificate. A handshake that fails verification is reported as an
//! unavailable certificate, never as an inspection failure.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::rustls::{self, pki_types::ServerName, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

use crate::inspect::types::{CertificateInfo, ProbeCategory, ProbeFailure};

fn failure(message: impl Into<String>) -> ProbeFailure {
    ProbeFailure::unavailable(ProbeCategory::Certificate, message)
}

fn client_config() -> Result<ClientConfig, ProbeFailure> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| failure(format!("TLS configuration error: {}", e)))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(config)
}

fn protocol_name(version: rustls::ProtocolVersion) -> String {
    match version {
        rustls::ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        rustls::ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        other => format!("{:?}", other),
    }
}

/// Parse a DER leaf certificate into report form
pub fn parse_certificate(
    der: &[u8],
    protocol_version: Option<String>,
    now: DateTime<Utc>,
) -> Result<CertificateInfo, ProbeFailure> {
    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| failure(format!("unparseable certificate: {}", e)))?;

    let validity = cert.validity();
    let valid_from = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or_else(|| failure("certificate notBefore out of range"))?;
    let valid_to = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or_else(|| failure("certificate notAfter out of range"))?;

    let mut subject_alt_names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => subject_alt_names.push(dns.to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        subject_alt_names.push(ip);
                    }
                }
                _ => {}
            }
        }
    }

    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        valid_from,
        valid_to,
        days_remaining: (valid_to - now).num_days(),
        subject_alt_names,
        protocol_version,
    })
}

fn ip_from_bytes(bytes: &[u8]) -> Option<String> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(std::net::Ipv4Addr::from(octets).to_string())
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(std::net::Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}

/// Handshake with `host:port` and describe the presented leaf certificate
pub async fn inspect_certificate(host: &str, port: u16) -> Result<CertificateInfo, ProbeFailure> {
    let host = host.trim_end_matches('.');
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| failure(format!("invalid server name '{}': {}", host, e)))?;

    let connector = TlsConnector::from(Arc::new(client_config()?));
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| failure(format!("connect to {}:{} failed: {}", host, port, e)))?;
    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| failure(format!("TLS handshake failed: {}", e)))?;

    let (_, session) = tls_stream.get_ref();
    let protocol_version = session.protocol_version().map(protocol_name);
    let leaf = session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| failure("server presented no certificate"))?;

    let info = parse_certificate(leaf.as_ref(), protocol_version, Utc::now())?;
    debug!(
        host,
        issuer = %info.issuer,
        days_remaining = info.days_remaining,
        "Certificate inspected"
    );
    Ok(info)
}
