//! Freshness arithmetic and Cache-Control handling.
//!
//! Two directions:
//! - outbound: the `cache-control` the edge emits for cached artifacts
//! - inbound: whether an origin response may be stored by a shared cache
//!
//! # Freshness
//!
//! `age` is whole seconds since `last_modified`. For a revalidate window `R`:
//! - no window: immutable, `s-maxage` one year
//! - `R - age >= 1`: fresh, `s-maxage = R - age`
//! - otherwise: stale, `s-maxage = 1`
//!
//! `s-maxage` never drops below 1 so downstream CDNs never see `s-maxage=0`.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::routing::router::Revalidate;

/// `s-maxage` for immutable entries (one year).
pub const IMMUTABLE_S_MAXAGE: u64 = 31_536_000;

/// `stale-while-revalidate` attached to every emitted directive (30 days).
pub const STALE_WHILE_REVALIDATE: u64 = 2_592_000;

/// Freshness of an entry at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Immutable,
    Fresh { s_max_age: u64 },
    Stale,
}

impl Freshness {
    /// `s-maxage` to advertise, always at least 1.
    pub fn s_max_age(&self) -> u64 {
        match self {
            Freshness::Immutable => IMMUTABLE_S_MAXAGE,
            Freshness::Fresh { s_max_age } => *s_max_age,
            Freshness::Stale => 1,
        }
    }

    /// Outbound `cache-control` value.
    pub fn cache_control(&self) -> String {
        format!(
            "s-maxage={}, stale-while-revalidate={}",
            self.s_max_age(),
            STALE_WHILE_REVALIDATE
        )
    }
}

/// `max(R - age, 1)` in whole seconds.
pub fn s_max_age(revalidate_secs: u64, age_secs: u64) -> u64 {
    revalidate_secs.saturating_sub(age_secs).max(1)
}

/// Classify an entry written at `last_modified_ms`, observed at `now_ms`.
pub fn freshness(revalidate: Revalidate, last_modified_ms: u64, now_ms: u64) -> Freshness {
    let Revalidate::After(window) = revalidate else {
        return Freshness::Immutable;
    };
    let age_secs = now_ms.saturating_sub(last_modified_ms) / 1000;
    let remaining = window.as_secs().saturating_sub(age_secs);
    if remaining == 0 {
        Freshness::Stale
    } else {
        Freshness::Fresh {
            s_max_age: s_max_age(window.as_secs(), age_secs),
        }
    }
}

/// Quoted strong ETag: truncated SHA-256 of the body.
pub fn etag_for(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("\"{}\"", hex::encode(&digest[..16]))
}

/// True when an `If-None-Match` header lists `etag` (or `*`).
pub fn if_none_match(header: &str, etag: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

/// Parsed `cache-control` of an origin response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub max_age: Option<Duration>,
    /// Shared cache specific max-age; takes precedence over `max-age`.
    pub s_maxage: Option<Duration>,
    pub no_store: bool,
    pub no_cache: bool,
    pub private: bool,
    pub stale_while_revalidate: Option<Duration>,
}

impl CacheControl {
    /// Parse a header value. Unknown directives are ignored.
    pub fn parse(header_value: &str) -> Self {
        let mut result = Self::default();

        for directive in header_value.split(',') {
            let directive = directive.trim().to_lowercase();
            if directive.is_empty() {
                continue;
            }

            if let Some((name, value)) = directive.split_once('=') {
                let secs = value.trim().trim_matches('"').parse::<u64>().ok();
                let Some(secs) = secs.map(Duration::from_secs) else {
                    continue;
                };
                match name.trim() {
                    "max-age" => result.max_age = Some(secs),
                    "s-maxage" => result.s_maxage = Some(secs),
                    "stale-while-revalidate" => result.stale_while_revalidate = Some(secs),
                    _ => {}
                }
            } else {
                match directive.as_str() {
                    "no-store" => result.no_store = true,
                    "no-cache" => result.no_cache = true,
                    "private" => result.private = true,
                    _ => {}
                }
            }
        }

        result
    }

    /// Whether a shared cache (this edge) may store the response.
    pub fn is_cacheable_by_shared_cache(&self) -> bool {
        !self.no_store && !self.private
    }

    /// `s-maxage`, else `max-age`.
    pub fn effective_max_age(&self) -> Option<Duration> {
        self.s_maxage.or(self.max_age)
    }
}
