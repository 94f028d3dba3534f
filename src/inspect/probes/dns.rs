// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! DNS record probe
//!
//! Looks up A, AAAA, MX, TXT, NS and CNAME records concurrently. Some record
//! types being absent is normal. The probe is unavailable only when every
//! lookup failed outright, and not found when the name has no records.

use std::net::IpAddr;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;
use tracing::debug;

use crate::inspect::types::{DnsRecords, MxRecord, ProbeCategory, ProbeFailure};

/// Outcome of one record-type lookup
enum Lookup<T> {
    Found(Vec<T>),
    Empty,
    Failed(String),
}

fn classify<T, L, F>(result: Result<L, ResolveError>, extract: F) -> Lookup<T>
where
    F: FnOnce(L) -> Vec<T>,
{
    match result {
        Ok(lookup) => {
            let records = extract(lookup);
            if records.is_empty() {
                Lookup::Empty
            } else {
                Lookup::Found(records)
            }
        }
        Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Lookup::Empty,
        Err(e) => Lookup::Failed(e.to_string()),
    }
}

pub async fn resolve_records(host: &str) -> Result<DnsRecords, ProbeFailure> {
    let host = host.trim_end_matches('.');
    // IP literals have nothing to resolve
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    match literal.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            return Ok(DnsRecords {
                a: vec![ip.to_string()],
                ..Default::default()
            })
        }
        Ok(IpAddr::V6(ip)) => {
            return Ok(DnsRecords {
                aaaa: vec![ip.to_string()],
                ..Default::default()
            })
        }
        Err(_) => {}
    }

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        .map_err(|e| ProbeFailure::unavailable(ProbeCategory::Dns, e.to_string()))?;

    let (a, aaaa, mx, txt, ns, cname) = tokio::join!(
        resolver.ipv4_lookup(host),
        resolver.ipv6_lookup(host),
        resolver.mx_lookup(host),
        resolver.txt_lookup(host),
        resolver.ns_lookup(host),
        resolver.lookup(host, RecordType::CNAME),
    );

    let a = classify(a, |l| l.iter().map(|ip| ip.to_string()).collect());
    let aaaa = classify(aaaa, |l| l.iter().map(|ip| ip.to_string()).collect());
    let mx = classify(mx, |l| {
        let mut records: Vec<MxRecord> = l
            .iter()
            .map(|mx| MxRecord {
                preference: mx.preference(),
                exchange: mx.exchange().to_string(),
            })
            .collect();
        records.sort_by_key(|r| r.preference);
        records
    });
    let txt = classify(txt, |l| {
        l.iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part).into_owned())
                    .collect::<String>()
            })
            .collect()
    });
    let ns = classify(ns, |l| l.iter().map(|name| name.to_string()).collect());
    let cname = classify(cname, |l| {
        l.iter()
            .filter_map(|rdata| match rdata {
                RData::CNAME(name) => Some(name.to_string()),
                _ => None,
            })
            .collect()
    });

    let mut records = DnsRecords::default();
    let mut failures = Vec::new();
    let mut any_answered = false;

    macro_rules! take {
        ($lookup:expr, $field:ident, $label:literal) => {
            match $lookup {
                Lookup::Found(values) => {
                    any_answered = true;
                    records.$field = values;
                }
                Lookup::Empty => any_answered = true,
                Lookup::Failed(reason) => failures.push(format!("{}: {}", $label, reason)),
            }
        };
    }
    take!(a, a, "A");
    take!(aaaa, aaaa, "AAAA");
    take!(mx, mx, "MX");
    take!(txt, txt, "TXT");
    take!(ns, ns, "NS");
    take!(cname, cname, "CNAME");

    debug!(
        host,
        a = records.a.len(),
        aaaa = records.aaaa.len(),
        mx = records.mx.len(),
        failed = failures.len(),
        "DNS records resolved"
    );

    if !any_answered {
        return Err(ProbeFailure::unavailable(
            ProbeCategory::Dns,
            failures.join("; "),
        ));
    }
    if records.is_empty() {
        return Err(ProbeFailure::not_found(
            ProbeCategory::Dns,
            format!("no DNS records for {}", host),
        ));
    }
    Ok(records)
}
