//! Response header reconciliation between middleware and static config.
//!
//! The renderer's headers are the base. The losing side is overlaid first and
//! the winning side last, each replacing headers by name. `set-cookie` is
//! additive across sides, except that when both set the same cookie name only
//! the winner's cookie survives.

use axum::http::{header, HeaderMap};

use crate::config::HeaderPrecedence;
use crate::http::headers::set_cookie_name;

/// Merge config and middleware headers into `base` under `precedence`.
pub fn merge_response_headers(
    base: &mut HeaderMap,
    config: &HeaderMap,
    middleware: &HeaderMap,
    precedence: HeaderPrecedence,
) {
    let (loser, winner) = match precedence {
        HeaderPrecedence::Config => (middleware, config),
        HeaderPrecedence::Middleware => (config, middleware),
    };
    overlay(base, loser);
    overlay(base, winner);
}

fn overlay(base: &mut HeaderMap, top: &HeaderMap) {
    for name in top.keys() {
        if *name == header::SET_COOKIE {
            continue;
        }
        base.remove(name);
        for value in top.get_all(name) {
            base.append(name.clone(), value.clone());
        }
    }

    for cookie in top.get_all(header::SET_COOKIE) {
        let incoming = cookie.to_str().ok().and_then(set_cookie_name);
        if let Some(incoming) = incoming {
            let kept: Vec<_> = base
                .get_all(header::SET_COOKIE)
                .iter()
                .filter(|v| v.to_str().ok().and_then(set_cookie_name) != Some(incoming))
                .cloned()
                .collect();
            base.remove(header::SET_COOKIE);
            for value in kept {
                base.append(header::SET_COOKIE, value);
            }
        }
        base.append(header::SET_COOKIE, cookie.clone());
    }
}
