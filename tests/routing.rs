//! Integration tests for host-and-path dispatch.

use bytes::Bytes;
use http::StatusCode;

use gatehouse::router::{
    Dispatch, PathRouter, RedirectTarget, RouteTarget, Router, RouterError, StaticTarget,
};

fn body(text: &'static str) -> RouteTarget {
    RouteTarget::Static(StaticTarget {
        body: Bytes::from_static(text.as_bytes()),
        content_type: "text/plain".into(),
    })
}

fn redirect(destination: &str) -> RedirectTarget {
    RedirectTarget {
        destination: destination.into(),
        code: StatusCode::FOUND,
        preserve_path: false,
    }
}

fn route_body(router: &Router, host: &str, path: &str) -> Option<Bytes> {
    match router.dispatch(host, path) {
        Dispatch::Route {
            target: RouteTarget::Static(target),
            ..
        } => Some(target.body.clone()),
        _ => None,
    }
}

#[test]
fn specificity_ordering_comprehensive() {
    let mut paths = PathRouter::new();
    paths.insert("/*rest", "catch-all").unwrap();
    paths.insert("/api/*rest", "api prefix").unwrap();
    paths.insert("/api/users/:id", "user").unwrap();
    paths.insert("/api/users/me", "me").unwrap();

    // Literal wins
    assert_eq!(paths.lookup("/api/users/me").value, Some(&"me"));

    // Parameter beats catch-all
    let user = paths.lookup("/api/users/42");
    assert_eq!(user.value, Some(&"user"));
    assert_eq!(user.params.get("id"), Some("42"));

    // Deeper catch-all wins over the root one
    let api = paths.lookup("/api/orders/9");
    assert_eq!(api.value, Some(&"api prefix"));
    assert_eq!(api.params.get("rest"), Some("orders/9"));

    assert_eq!(paths.lookup("/health").value, Some(&"catch-all"));
}

#[test]
fn same_shape_patterns_conflict() {
    let mut paths = PathRouter::new();
    paths.insert("/users/:id", 1).unwrap();
    let err = paths.insert("/users/:name", 2).unwrap_err();
    assert!(matches!(err, RouterError::Conflict { .. }));
}

#[test]
fn exact_host_beats_wildcard() {
    let mut router = Router::new();
    router.add_service("*.example.com", body("wildcard")).unwrap();
    router.add_service("api.example.com", body("exact")).unwrap();

    assert_eq!(
        route_body(&router, "api.example.com", "/"),
        Some(Bytes::from_static(b"exact"))
    );
    assert_eq!(
        route_body(&router, "www.example.com", "/"),
        Some(Bytes::from_static(b"wildcard"))
    );
}

#[test]
fn wildcard_covers_one_level_only() {
    let mut router = Router::new();
    router.add_service("*.example.com", body("wildcard")).unwrap();

    assert!(matches!(
        router.dispatch("a.b.example.com", "/"),
        Dispatch::NotFound
    ));
    assert!(matches!(router.dispatch("example.com", "/"), Dispatch::NotFound));
    assert!(matches!(router.dispatch("localhost", "/"), Dispatch::NotFound));
}

#[test]
fn exact_host_miss_falls_back_to_wildcard_path() {
    let mut router = Router::new();
    router.add_route("shop.example.com", "/cart", body("cart")).unwrap();
    router.add_route("*.example.com", "/help", body("help")).unwrap();

    assert_eq!(
        route_body(&router, "shop.example.com", "/help"),
        Some(Bytes::from_static(b"help"))
    );
}

#[test]
fn redirect_beats_route_on_same_host() {
    let mut router = Router::new();
    router.add_route("app.test", "/old", body("stale")).unwrap();
    router
        .add_redirect("app.test", "/old", redirect("https://app.test/new"))
        .unwrap();

    match router.dispatch("app.test", "/old") {
        Dispatch::Redirect { target, .. } => {
            assert_eq!(target.destination, "https://app.test/new");
        }
        other => panic!("expected redirect, got {other:?}"),
    }
}

#[test]
fn hosts_match_literally() {
    let mut router = Router::new();
    router.add_service("app.test", body("app")).unwrap();

    assert!(route_body(&router, "app.test", "/").is_some());
    assert!(route_body(&router, "APP.test", "/").is_none());
    assert!(route_body(&router, "app.test:8080", "/").is_none());
}
