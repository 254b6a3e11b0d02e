use super::core::path_to_regex;
use super::{HandlerRef, MatchResult, Matcher, RegexMatcher, Route, RouteTable};
use http::Method;
use rstest::rstest;

fn noop(pattern: &str, methods: &[Method]) -> Route {
    Route::new(
        methods.to_vec(),
        pattern,
        HandlerRef::closure(|_res, _req| Ok(())),
    )
}

fn table(routes: Vec<Route>) -> RegexMatcher {
    routes.into_iter().collect::<RouteTable>().compile().unwrap()
}

#[test]
fn test_path_to_regex_basic() {
    let (re, params) = path_to_regex("/items/{id}").unwrap();
    assert!(re.is_match("/items/42"));
    assert!(!re.is_match("/items/42/extra"));
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].as_ref(), "id");
}

#[test]
fn test_path_to_regex_root_and_literals_are_escaped() {
    let (re, _) = path_to_regex("/").unwrap();
    assert!(re.is_match("/"));
    assert!(!re.is_match("/x"));

    let (re, _) = path_to_regex("/v1.0/files").unwrap();
    assert!(re.is_match("/v1.0/files"));
    assert!(!re.is_match("/v1x0/files"));
}

#[test]
fn test_path_to_regex_typed_placeholder() {
    let (re, params) = path_to_regex(r"/items/{id:\d{2,}}/{name}.json").unwrap();
    assert!(re.is_match("/items/42/rex.json"));
    assert!(!re.is_match("/items/4/rex.json"));
    assert_eq!(
        params.iter().map(|p| p.as_ref()).collect::<Vec<_>>(),
        vec!["id", "name"]
    );
}

#[rstest]
#[case("/items/{id")]
#[case("/items/id}")]
#[case("/items/{}")]
#[case("/items/{id:[}")]
#[case("/items/{id:(\\d+)}")]
fn test_path_to_regex_rejects_bad_patterns(#[case] pattern: &str) {
    assert!(path_to_regex(pattern).is_err());
}

#[test]
fn test_found_extracts_every_placeholder() {
    let matcher = table(vec![noop("/org/{org}/users/{user}", &[Method::GET])]);
    match matcher.match_route(&Method::GET, "/org/acme/users/7") {
        MatchResult::Found(m) => {
            assert_eq!(m.get_param("org"), Some("acme"));
            assert_eq!(m.get_param("user"), Some("7"));
            assert_eq!(m.params.len(), 2);
        }
        other => panic!("expected Found, got {other:?}"),
    }
}

#[test]
fn test_literal_registered_first_wins() {
    let matcher = table(vec![
        noop("/pet/all", &[Method::GET]).name("literal"),
        noop("/pet/{id}", &[Method::GET]).name("param"),
    ]);
    match matcher.match_route(&Method::GET, "/pet/all") {
        MatchResult::Found(m) => assert_eq!(m.route.route_name(), Some("literal")),
        other => panic!("expected Found, got {other:?}"),
    }
}

#[test]
fn test_wrong_verb_is_method_not_allowed() {
    let matcher = table(vec![
        noop("/items/{id}", &[Method::GET]),
        noop("/items/{id}", &[Method::DELETE]),
        noop("/other", &[Method::POST]),
    ]);
    match matcher.match_route(&Method::POST, "/items/1") {
        MatchResult::MethodNotAllowed(allowed) => {
            assert_eq!(allowed, vec![Method::GET, Method::DELETE]);
        }
        other => panic!("expected MethodNotAllowed, got {other:?}"),
    }
    assert!(matches!(
        matcher.match_route(&Method::GET, "/nope"),
        MatchResult::NotFound
    ));
}

#[test]
fn test_later_route_can_serve_other_verb() {
    let matcher = table(vec![
        noop("/items/{id}", &[Method::GET]).name("get"),
        noop("/items/{id}", &[Method::PUT]).name("put"),
    ]);
    match matcher.match_route(&Method::PUT, "/items/1") {
        MatchResult::Found(m) => assert_eq!(m.route.route_name(), Some("put")),
        other => panic!("expected Found, got {other:?}"),
    }
}

#[test]
fn test_typed_placeholder_falls_through_to_next_route() {
    let matcher = table(vec![
        noop(r"/items/{id:\d+}", &[Method::GET]).name("numeric"),
        noop("/items/{slug}", &[Method::GET]).name("slug"),
    ]);
    let name = |path: &str| match matcher.match_route(&Method::GET, path) {
        MatchResult::Found(m) => m.route.route_name().map(str::to_string),
        _ => None,
    };
    assert_eq!(name("/items/42").as_deref(), Some("numeric"));
    assert_eq!(name("/items/rex").as_deref(), Some("slug"));
}

#[test]
fn test_head_is_served_by_get_and_any_accepts_everything() {
    let matcher = table(vec![
        noop("/items", &[Method::GET]),
        Route::any("/anything", |_res, _req| Ok(())),
    ]);
    assert!(matches!(
        matcher.match_route(&Method::HEAD, "/items"),
        MatchResult::Found(_)
    ));
    assert!(matches!(
        matcher.match_route(&Method::PATCH, "/anything"),
        MatchResult::Found(_)
    ));
}

#[test]
fn test_dump_lists_routes_in_order() {
    let table: RouteTable = vec![
        Route::new(
            [Method::GET],
            "/pets/{id}",
            HandlerRef::method("Pets", "show"),
        )
        .output("xml"),
        Route::any("/echo", |_res, _req| Ok(())),
    ]
    .into_iter()
    .collect();
    assert_eq!(
        table.dump(),
        vec![
            "GET /pets/{id} -> Pets::show [xml]".to_string(),
            "* /echo -> <closure>".to_string(),
        ]
    );
}
