//! Resultspec resolution against a populated archive.

mod common;

use common::Workspace;
use hdat_error::HdatError;
use hdat_harness::{ResultSpec, resolve_casespec};
use hdat_types::{CaseAddress, MetricValue};

fn run(ws: &Workspace, suite: &str, case: &str, x: i64) -> String {
    ws.set_x(case, x);
    ws.ctx
        .controller()
        .run_case(&CaseAddress::new(suite, case))
        .result_id
        .expect("archived")
}

fn x_of(ws: &Workspace, spec: &str) -> Vec<MetricValue> {
    ws.ctx
        .resolver()
        .resolve(spec)
        .expect(spec)
        .into_iter()
        .map(|result| result.metrics["x"].clone())
        .collect()
}

#[test]
fn empty_archive_resolves_to_nothing() {
    let ws = Workspace::new();
    let results = ws.ctx.resolver().resolve("").expect("empty spec");
    assert!(results.is_empty());
}

#[test]
fn known_case_without_results_is_unused() {
    let ws = Workspace::new();
    match ws.ctx.resolver().resolve("a/1") {
        Err(HdatError::UnusedCase { cases }) => assert_eq!(cases, vec!["a/1".to_owned()]),
        other => panic!("expected UnusedCase, got {other:?}"),
    }
}

#[test]
fn unknown_identifiers_name_the_alternatives() {
    let ws = Workspace::new();
    let err = ws.ctx.resolver().resolve("zzz/1").expect_err("unknown suite");
    assert!(matches!(err, HdatError::UnknownSuite { .. }), "err={err}");
    assert!(err.to_string().contains("\"a\""), "err={err}");

    let err = ws.ctx.resolver().resolve("a/9").expect_err("unknown case");
    match err {
        HdatError::MissingCase { known, .. } => assert_eq!(known, vec!["1", "2"]),
        other => panic!("expected MissingCase, got {other:?}"),
    }
}

#[test]
fn tilde_counts_back_from_the_newest() {
    let ws = Workspace::new();
    for x in [1, 2, 3] {
        run(&ws, "a", "1", x);
    }
    assert_eq!(x_of(&ws, "a/1"), vec![MetricValue::Int(3)]);
    assert_eq!(x_of(&ws, "a/1/~0"), vec![MetricValue::Int(3)]);
    assert_eq!(x_of(&ws, "a/1/~2"), vec![MetricValue::Int(1)]);

    match ws.ctx.resolver().resolve("a/1/~3") {
        Err(HdatError::OutOfRange { index, available, .. }) => {
            assert_eq!((index, available), (3, 3));
        }
        other => panic!("expected OutOfRange, got {other:?}"),
    }
    let huge = format!("a/1/~{}", u64::MAX);
    assert!(matches!(
        ws.ctx.resolver().resolve(&huge),
        Err(HdatError::OutOfRange { available: 3, .. })
    ));
}

#[test]
fn exact_ids_and_file_paths_resolve_to_the_stored_result() {
    let ws = Workspace::new();
    let first = run(&ws, "a", "1", 7);
    run(&ws, "a", "1", 8);

    let exact = ws.ctx.resolver().resolve(&format!("a/1/{first}")).expect("exact");
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].result_id, first);
    assert_eq!(exact[0].metrics["x"], MetricValue::Int(7));

    let path = ws.ctx.archive().result_path("a", "1", &first);
    let by_path = ws
        .ctx
        .resolver()
        .resolve(path.to_str().expect("utf8 path"))
        .expect("path spec");
    assert!(by_path[0].is_identical(&exact[0]));

    let err = ws.ctx.resolver().resolve("a/1/nope").expect_err("absent id");
    assert!(matches!(err, HdatError::ResultNotFound { .. }), "err={err}");
}

#[test]
fn suite_spec_reports_every_gap() {
    let ws = Workspace::new();
    run(&ws, "a", "1", 1);
    match ws.ctx.resolver().resolve("a") {
        Err(HdatError::UnusedCase { cases }) => assert_eq!(cases, vec!["a/2".to_owned()]),
        other => panic!("expected UnusedCase, got {other:?}"),
    }

    run(&ws, "a", "2", 2);
    assert_eq!(
        x_of(&ws, "a"),
        vec![MetricValue::Int(1), MetricValue::Int(2)],
        "case=declaration_order"
    );
}

#[test]
fn all_spec_walks_archived_suites() {
    let ws = Workspace::new();
    let cases = resolve_casespec(ws.ctx.registry(), "").expect("all cases");
    assert_eq!(cases.len(), 3);
    ws.ctx.controller().run_cases(&cases);

    let results = ws.ctx.resolver().resolve("").expect("all");
    let addresses: Vec<String> = results.iter().map(|r| r.address().to_string()).collect();
    assert_eq!(addresses, vec!["a/1", "a/2", "b/1"]);
}

#[test]
fn resolve_all_concatenates_in_spec_order() {
    let ws = Workspace::new();
    run(&ws, "a", "1", 1);
    run(&ws, "b", "1", 2);
    let results = ws
        .ctx
        .resolver()
        .resolve_all(&["b/1", "a/1"])
        .expect("resolve all");
    let addresses: Vec<String> = results.iter().map(|r| r.address().to_string()).collect();
    assert_eq!(addresses, vec!["b/1", "a/1"]);
}

#[test]
fn malformed_specs_are_rejected() {
    let ws = Workspace::new();
    for spec in ["a/1/x/y", "a//1", "/a", "a/1/~x", "a/1/~-1"] {
        let err = ws.ctx.resolver().resolve(spec).expect_err(spec);
        assert!(
            matches!(err, HdatError::InvalidResultSpec { .. }),
            "case={spec} err={err}"
        );
    }
    assert_eq!(ResultSpec::parse_address("a").expect("suite"), ResultSpec::Suite("a".to_owned()));
}
