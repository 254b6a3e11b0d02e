use brrtdispatch::dispatcher::Dispatcher;
use brrtdispatch::error::HttpError;
use brrtdispatch::output::OutputRegistry;
use brrtdispatch::router::{Route, RouteTable};
use brrtdispatch::server::{Http1Writer, Request, SerializationMode};
use http::Method;
use rstest::rstest;
use serde_json::json;

mod common;
use common::dispatch;

fn echo_table() -> RouteTable {
    RouteTable::new()
        .with_route(Route::post("/orders/{id}", |res, req| {
            res.write(&json!({
                "id": req.param_str("id"),
                "qty": req.param("qty"),
                "source": req.param_str("source"),
            }))
        }))
        .with_route(Route::get("/merge", |res, _req| {
            res.set_mode(SerializationMode::ForceSingleObject);
            res.write(&json!({ "a": 1, "b": 1 }))?;
            res.write(&json!({ "b": 2 }))
        }))
        .with_route(Route::get("/list", |res, _req| {
            res.set_mode(SerializationMode::ForceArray);
            res.write(&json!({ "a": 1 }))
        }))
        .with_route(Route::get("/empty", |res, _req| {
            res.set_status(204);
            res.write(&json!({ "ignored": true }))
        }))
        .with_route(Route::get("/bogus-status", |_res, _req| {
            Err(HttpError::custom(1200, "Way Out", "WayOutException", "nope"))
        }))
}

#[test]
fn handle_http_round_trip() {
    let dispatcher = Dispatcher::from_table(&echo_table()).unwrap();
    let req = http::Request::builder()
        .method(Method::POST)
        .uri("/orders/9?source=web")
        .header("content-type", "application/json")
        .body(br#"{"qty": 3, "source": "body"}"#.to_vec())
        .unwrap();

    let res = dispatcher.handle_http(req);
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    // query beats body
    assert_eq!(body, json!({ "id": "9", "qty": 3, "source": "web" }));
}

#[test]
fn unwritable_status_still_renders_an_error_body() {
    let dispatcher = Dispatcher::from_table(&echo_table()).unwrap();
    let req = http::Request::builder()
        .uri("/bogus-status")
        .body(Vec::new())
        .unwrap();

    let res = dispatcher.handle_http(req);
    assert_eq!(res.status(), 500);
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["code"], 500);
    assert_eq!(body["metadata"]["invalid_status"], 1200);
}

#[test]
fn form_bodies_are_parameters() {
    let dispatcher = Dispatcher::from_table(&echo_table()).unwrap();
    let req = Request::new(Method::POST, "/orders/1")
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body(b"qty=5&source=form".to_vec());
    let (_, out) = dispatch(&dispatcher, req);
    assert_eq!(out.body_json(), json!({ "id": "1", "qty": "5", "source": "form" }));
}

#[test]
fn serialization_modes_apply_before_formatting() {
    let dispatcher = Dispatcher::from_table(&echo_table()).unwrap();

    let (_, out) = dispatch(&dispatcher, Request::new(Method::GET, "/merge"));
    assert_eq!(out.body_str(), r#"{"a":1,"b":2}"#);

    let req = Request::new(Method::GET, "/list").with_header("Accept", "text/csv");
    let (_, out) = dispatch(&dispatcher, req);
    assert_eq!(out.body_str(), "a\n1\n");
}

#[test]
fn no_content_has_no_body() {
    let dispatcher = Dispatcher::from_table(&echo_table()).unwrap();
    let mut writer = Http1Writer::new(Vec::new());
    let outcome = dispatcher.handle(Request::new(Method::GET, "/empty"), &mut writer);
    assert_eq!(outcome.status, 204);

    let wire = String::from_utf8(writer.into_inner()).unwrap();
    assert!(wire.starts_with("HTTP/1.1 204 No Content\r\n"), "{wire}");
    assert!(wire.ends_with("\r\n\r\n"), "{wire}");
    assert!(!wire.contains("ignored"));
}

#[test]
fn http1_writer_frames_response() {
    let dispatcher = Dispatcher::from_table(&echo_table()).unwrap();
    let mut writer = Http1Writer::new(Vec::new());
    dispatcher.handle(Request::new(Method::GET, "/merge"), &mut writer);

    let wire = String::from_utf8(writer.into_inner()).unwrap();
    let (head, body) = wire.split_once("\r\n\r\n").unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Type: application/json"));
    assert!(head.contains(&format!("Content-Length: {}", body.len())));
    assert_eq!(body, r#"{"a":1,"b":2}"#);
}

#[rstest]
#[case("json")]
#[case("xml")]
#[case("csv")]
#[case("yaml")]
#[case("text")]
fn formatting_is_deterministic(#[case] name: &str) {
    let registry = OutputRegistry::with_defaults();
    let processor = registry.get(name).unwrap();
    let payload = json!([
        { "id": 1, "name": "Rex", "tags": ["a", "b"] },
        { "id": 2, "name": "Tom", "owner": null }
    ]);
    let first = processor.format(&payload).unwrap();
    let second = processor.format(&payload).unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}
