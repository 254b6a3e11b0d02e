use super::*;
use clap::Parser;

const SCHEMA: &str = r#"
openapi: 3.0.0
servers:
  - url: /api
paths:
  /pets/{id}:
    get:
      operationId: Pets::show
      responses:
        "200":
          content:
            application/json: {}
  /pets/mine:
    get:
      operationId: Pets.mine
"#;

fn schema() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("openapi.yaml");
    std::fs::write(&path, SCHEMA).unwrap();
    (dir, path)
}

fn run(args: &[&str]) -> String {
    let cli = Cli::try_parse_from(args).unwrap();
    let mut out = Vec::new();
    run_cli_with_output(cli, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn routes_prints_sorted_table() {
    let (_dir, path) = schema();
    let out = run(&["brrtdispatch", "routes", "--spec", path.to_str().unwrap()]);
    assert_eq!(
        out,
        "GET /api/pets/mine -> Pets::mine\nGET /api/pets/{id} -> Pets::show [json]\n"
    );
}

#[test]
fn probe_dispatches_to_echo_controller() {
    let (_dir, path) = schema();
    let out = run(&[
        "brrtdispatch",
        "probe",
        "--spec",
        path.to_str().unwrap(),
        "--path",
        "/api/pets/42",
    ]);
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out}");
    assert!(out.contains("\"handler\":\"Pets::show\""), "{out}");
    assert!(out.contains("\"id\":\"42\""), "{out}");
}

#[test]
fn probe_reports_method_not_allowed() {
    let (_dir, path) = schema();
    let out = run(&[
        "brrtdispatch",
        "probe",
        "--spec",
        path.to_str().unwrap(),
        "--method",
        "delete",
        "--path",
        "/api/pets/42",
    ]);
    assert!(out.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{out}");
    assert!(out.contains("Allow: GET\r\n"), "{out}");
}

#[test]
fn missing_spec_is_an_error() {
    let cli = Cli::try_parse_from(["brrtdispatch", "routes", "--spec", "/nope.yaml"]).unwrap();
    assert!(run_cli_with_output(cli, &mut Vec::new()).is_err());
}
