//! Property tests for the pure parts of routing and caching.

mod common;

use std::time::Duration;

use axum::http::Method;
use proptest::prelude::*;

use edge_router::cache::control::{freshness, Freshness};
use edge_router::http::request::InternalRequest;
use edge_router::pipeline::Manifest;
use edge_router::revalidation::{dedupe_key, shard_id, RevalidationJob};
use edge_router::rewrite::engine::{Phase, RewriteOutcome};
use edge_router::routing::router::Revalidate;

fn manifest(raw: &str) -> Manifest {
    Manifest::compile(&common::config(raw)).unwrap()
}

fn segment() -> impl Strategy<Value = String> {
    "[b-z0-9][a-z0-9-]{0,10}"
}

proptest! {
    #[test]
    fn shard_is_stable_and_in_range(path in "/[a-z0-9/]{0,40}", shards in 1u32..64) {
        let first = shard_id(&path, shards);
        prop_assert!(first < shards);
        prop_assert_eq!(first, shard_id(&path, shards));

        let job = RevalidationJob::new(path.clone(), "pos.example", "\"e\"", 7, shards);
        prop_assert_eq!(job.shard_id, first);
        prop_assert_eq!(job.dedupe_key, dedupe_key(&path, 7, "\"e\""));
    }

    #[test]
    fn dedupe_key_tracks_generation(path in "/[a-z]{1,20}", lm in 0u64..u64::MAX - 1) {
        prop_assert_eq!(dedupe_key(&path, lm, "a"), dedupe_key(&path, lm, "a"));
        prop_assert_ne!(dedupe_key(&path, lm, "a"), dedupe_key(&path, lm + 1, "a"));
        prop_assert_ne!(dedupe_key(&path, lm, "a"), dedupe_key(&path, lm, "b"));
    }

    #[test]
    fn freshness_only_decays(
        window in 1u64..86_400,
        written in 0u64..1_000_000_000,
        first in 0u64..200_000_000,
        later in 0u64..200_000_000,
    ) {
        let revalidate = Revalidate::After(Duration::from_secs(window));
        let t1 = written + first.min(later);
        let t2 = written + first.max(later);
        let a = freshness(revalidate, written, t1);
        let b = freshness(revalidate, written, t2);

        prop_assert!(a.s_max_age() >= 1);
        prop_assert!(b.s_max_age() <= a.s_max_age());
        if a == Freshness::Stale {
            prop_assert_eq!(b, Freshness::Stale);
        }
    }

    #[test]
    fn rewrite_reaches_fixed_point(id in segment(), tab in segment()) {
        let m = manifest(
            r#"
[[rewrites.before_files]]
source = "/legacy/:id"
destination = "/new/:id"
"#,
        );
        let mut req = InternalRequest::new(Method::GET, &format!("/legacy/{id}?tab={tab}"));
        prop_assert_eq!(m.rewrites.apply(Phase::BeforeFiles, &mut req), RewriteOutcome::Rewritten);
        prop_assert_eq!(req.path.clone(), format!("/new/{id}"));
        prop_assert_eq!(req.query.get("tab"), Some(tab.as_str()));

        prop_assert_eq!(m.rewrites.apply(Phase::BeforeFiles, &mut req), RewriteOutcome::Unchanged);
    }

    #[test]
    fn trailing_slash_redirect_converges(parts in prop::collection::vec(segment(), 1..5)) {
        let m = manifest("");
        let path = format!("/{}/", parts.join("/"));

        let mut req = InternalRequest::new(Method::GET, &path);
        let url = m.normalizer.normalize(&req).unwrap();
        let redirect = m.rewrites.redirect_check(&mut req, &url).expect("trailing slash redirects");
        let location = redirect.location().unwrap().to_string();
        prop_assert_eq!(location.clone(), format!("/{}", parts.join("/")));

        let mut followed = InternalRequest::new(Method::GET, &location);
        let url = m.normalizer.normalize(&followed).unwrap();
        prop_assert!(m.rewrites.redirect_check(&mut followed, &url).is_none());
    }
}

#[test]
fn immutable_entries_never_go_stale() {
    let f = freshness(Revalidate::Never, 0, u64::MAX / 2);
    assert_eq!(f, Freshness::Immutable);
    assert_eq!(f.s_max_age(), 31_536_000);
}
