//! Canonical document tests: hand-written UCL/JSON inputs checked against
//! their expected parsed shape and re-emitted form.

use ucl::{dumps, parse, Format};

#[test]
fn nginx_style_block_with_nested_objects() {
    let doc = parse(
        r#"
        worker_processes  4;
        http {
            server {
                listen       80;
                server_name  example.com;
            }
        }
        "#,
    )
    .unwrap();

    assert_eq!(doc.get_path("worker_processes").unwrap().as_int(), Some(4));
    let server_name = doc.get_path("http.server.server_name").unwrap();
    assert_eq!(server_name.as_str().unwrap(), "example.com");
}

#[test]
fn canonical_json_parses_unchanged() {
    let input = r#"{"a":1,"b":[1,2,3],"c":{"d":true,"e":null}}"#;
    let doc = parse(input).unwrap();
    let back = dumps(&doc, Format::CompactJson);
    let reparsed = parse(&back).unwrap();
    assert!(doc.deep_eq(&reparsed));
}

#[test]
fn duplicate_keys_become_implicit_arrays_across_formats() {
    let doc = parse("a = 1; a = 2; a = 3;").unwrap();

    let json = dumps(&doc, Format::CompactJson);
    assert_eq!(json, "{\"a\":[1,2,3]}");

    let config = dumps(&doc, Format::Config);
    assert_eq!(config, "a = 1;\na = 2;\na = 3;\n");
}

#[test]
fn numeric_suffixes_resolve_to_documented_values() {
    let doc = parse("a = 10k; b = 10kb; c = 10min; d = 0.2s; e = 10ms;").unwrap();
    assert_eq!(doc.get_path("a").unwrap().as_int(), Some(10000));
    assert_eq!(doc.get_path("b").unwrap().as_int(), Some(10240));
    assert_eq!(doc.get_path("c").unwrap().as_float(), Some(600.0));
    assert_eq!(doc.get_path("d").unwrap().as_float(), Some(0.2));
    assert_eq!(doc.get_path("e").unwrap().as_float(), Some(0.01));
}

#[test]
fn yaml_emits_implicit_array_as_sequence() {
    let doc = parse(r#""x": 1, "x": 2"#).unwrap();
    let yaml = dumps(&doc, Format::Yaml);
    assert!(yaml.contains("x:"));
    assert!(yaml.contains("- 1"));
    assert!(yaml.contains("- 2"));
}
