use std::error::Error;

use http::Method;

use crate::{
    errors::{ConfigError, PorticoError},
    server::router::{handler_fn, BoxedHandler, PathPattern, Router, WILDCARD},
};

fn noop() -> BoxedHandler {
    handler_fn(|context| async move { Ok(context) })
}

#[test]
fn test_literal_pattern() -> Result<(), Box<dyn Error>> {
    let pattern = PathPattern::parse("/hello")?;

    assert!(pattern
        .matches("/hello")
        .is_some());
    assert!(pattern
        .matches("/hello/")
        .is_none());
    assert!(pattern
        .matches("/hell")
        .is_none());
    assert!(pattern
        .matches("hello")
        .is_none());

    Ok(())
}

#[test]
fn test_root_pattern() -> Result<(), Box<dyn Error>> {
    let pattern = PathPattern::parse("/")?;

    assert!(pattern
        .matches("/")
        .is_some());
    assert!(pattern
        .matches("/hello")
        .is_none());

    Ok(())
}

#[test]
fn test_parameters_bind_segments() -> Result<(), Box<dyn Error>> {
    let pattern = PathPattern::parse("/users/{id}/posts/{post}")?;

    let params = pattern
        .matches("/users/42/posts/7")
        .ok_or("no match")?;
    assert_eq!(params.get("id"), Some("42"));
    assert_eq!(params.get("post"), Some("7"));
    assert_eq!(params.len(), 2);
    assert_eq!(
        params
            .iter()
            .collect::<Vec<_>>(),
        vec![("id", "42"), ("post", "7")]
    );

    assert!(pattern
        .matches("/users//posts/7")
        .is_none());
    assert!(pattern
        .matches("/users/42/posts")
        .is_none());

    Ok(())
}

#[test]
fn test_wildcard_matches_remainder() -> Result<(), Box<dyn Error>> {
    let pattern = PathPattern::parse("/static/*")?;

    let params = pattern
        .matches("/static/css/site.css")
        .ok_or("no match")?;
    assert_eq!(params.get(WILDCARD), Some("css/site.css"));

    let params = pattern
        .matches("/static")
        .ok_or("no match")?;
    assert_eq!(params.get(WILDCARD), Some(""));

    assert!(pattern
        .matches("/assets/site.css")
        .is_none());

    Ok(())
}

#[test]
fn test_invalid_patterns() {
    for pattern in ["hello", "/users/{}", "/{id}/{id}", "/*/tail", "/users/id{x}"] {
        let result = PathPattern::parse(pattern);
        assert!(
            matches!(result, Err(PorticoError::Config(ConfigError::InvalidRoute { .. }))),
            "pattern {} should be rejected",
            pattern
        );
    }
}

#[test]
fn test_build_reports_invalid_route() {
    let result = Router::builder()
        .get("/ok", noop())
        .get("broken", noop())
        .build();

    assert_eq!(
        result.err(),
        Some(PorticoError::Config(ConfigError::InvalidRoute {
            pattern: "broken".to_string(),
            reason: "pattern must start with '/'".to_string(),
        }))
    );
}

#[test]
fn test_first_match_wins() -> Result<(), Box<dyn Error>> {
    let router = Router::builder()
        .get("/users/me", noop())
        .get("/users/{id}", noop())
        .get("/users/*", noop())
        .build()?;

    let me = router
        .match_route(&Method::GET, "/users/me")
        .ok_or("no match")?;
    assert_eq!(
        me.route()
            .pattern()
            .as_str(),
        "/users/me"
    );
    assert!(me
        .params()
        .is_empty());

    let other = router
        .match_route(&Method::GET, "/users/42")
        .ok_or("no match")?;
    assert_eq!(
        other
            .route()
            .pattern()
            .as_str(),
        "/users/{id}"
    );
    assert_eq!(
        other
            .params()
            .get("id"),
        Some("42")
    );

    let nested = router
        .match_route(&Method::GET, "/users/42/posts")
        .ok_or("no match")?;
    assert_eq!(
        nested
            .route()
            .pattern()
            .as_str(),
        "/users/*"
    );

    Ok(())
}

#[test]
fn test_catch_all_registered_first_shadows_later_routes() -> Result<(), Box<dyn Error>> {
    let router = Router::builder()
        .get("/*", noop())
        .get("/hello", noop())
        .build()?;

    let matched = router
        .match_route(&Method::GET, "/hello")
        .ok_or("no match")?;
    assert_eq!(
        matched
            .route()
            .pattern()
            .as_str(),
        "/*"
    );

    Ok(())
}

#[test]
fn test_method_must_match() -> Result<(), Box<dyn Error>> {
    let router = Router::builder()
        .post("/items", noop())
        .put("/items/{id}", noop())
        .delete("/items/{id}", noop())
        .build()?;

    assert!(router
        .match_route(&Method::GET, "/items")
        .is_none());
    assert_eq!(
        router
            .match_route(&Method::DELETE, "/items/1")
            .ok_or("no match")?
            .route()
            .method(),
        &Method::DELETE
    );
    assert!(router
        .match_route(&Method::POST, "/missing")
        .is_none());

    Ok(())
}

#[test]
fn test_routes_keep_registration_order() -> Result<(), Box<dyn Error>> {
    let router = Router::builder()
        .options("/a", noop())
        .head("/b", noop())
        .patch("/c", noop())
        .route(Method::TRACE, "/d", noop())
        .build()?;

    let patterns: Vec<&str> = router
        .routes()
        .iter()
        .map(|route| {
            route
                .pattern()
                .as_str()
        })
        .collect();
    assert_eq!(patterns, vec!["/a", "/b", "/c", "/d"]);

    Ok(())
}
