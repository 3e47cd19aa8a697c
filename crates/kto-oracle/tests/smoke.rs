use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use kto_dtype::Value;
use kto_kernels::builtin_registry;
use kto_oracle::capture::{
    EXPLICIT_CAPTURE_DIR, capture_path, load_capture, load_unit_capture, verify_catalog_captures,
    write_catalog_captures, write_capture,
};
use kto_oracle::fixtures::load_fixture_document;
use kto_oracle::{KernelStatus, OracleCatalog, OracleConfig};
use kto_spec::load_specification;

fn bundled_catalog(config: &OracleConfig) -> OracleCatalog {
    let crate_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let declarations = load_specification(&crate_root.join("fixtures/kernel_specification.json"))
        .expect("bundled declarations load");
    let fixtures = load_fixture_document(&crate_root.join("fixtures/kernel_test_data.json"))
        .expect("bundled fixtures load");
    OracleCatalog::build(&declarations, &fixtures, &builtin_registry(), config)
        .expect("bundled catalog builds")
}

fn scratch_dir(label: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    std::env::temp_dir().join(format!("kto_{label}_{ts}"))
}

#[test]
fn bundled_catalog_has_expected_shape() {
    let catalog = bundled_catalog(&OracleConfig::default_paths());

    let counts: Vec<(&str, usize)> = catalog
        .specifications()
        .map(|spec| (spec.name(), spec.tests().len()))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("Index_carry_64", 4),
            ("ListArray_num_64", 3),
            ("ListArray_num_U32", 2),
            ("ListOffsetArray_counts_64", 2),
            ("NumpyArray_scale_float64", 2),
            ("add_one_64", 4),
            ("checked_div_64", 4),
            ("localindex_64", 0),
        ]
    );
    assert_eq!(catalog.case_count(), 21);
    assert!(catalog.specification("argsort_64").is_none());

    let localindex = catalog.specification("localindex_64").expect("declared");
    assert!(!localindex.is_enabled());
    assert_eq!(localindex.status(), KernelStatus::NoTests);
}

#[test]
fn checked_div_has_one_division_by_zero_case() {
    let catalog = bundled_catalog(&OracleConfig::default_paths());
    let tests = catalog.tests("checked_div_64").expect("generated");
    let failures: Vec<_> = tests.iter().filter(|case| !case.success).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].inargs.get("y"), Some(&Value::Int(0)));
    assert_eq!(failures[0].inargs.get("z"), Some(&Value::ints(&[123])));
}

#[test]
fn failed_cases_carry_nonempty_placeholder_buffers() {
    let catalog = bundled_catalog(&OracleConfig::default_paths());
    for spec in catalog.specifications() {
        for case in spec.tests().iter().filter(|case| !case.success) {
            assert!(case.outargs.is_none(), "{}", spec.name());
            for arg in spec.args().iter().filter(|arg| arg.is_output()) {
                let buffer = case
                    .inargs
                    .get(&arg.name)
                    .and_then(Value::as_list)
                    .expect("output buffer recorded");
                assert!(!buffer.is_empty(), "{}", spec.name());
                assert!(buffer.iter().all(|value| *value == arg.type_name.placeholder()));
            }
        }
    }
}

#[test]
fn group_products_follow_declaration_order() {
    let catalog = bundled_catalog(&OracleConfig::default_paths());
    let tests = catalog.tests("Index_carry_64").expect("generated");
    let carries: Vec<_> = tests
        .iter()
        .map(|case| (case.inargs.get("fromindex").cloned(), case.inargs.get("carry").cloned()))
        .collect();
    assert_eq!(carries[0], (Some(Value::ints(&[10, 11, 12])), Some(Value::ints(&[2, 0]))));
    assert_eq!(carries[1], (Some(Value::ints(&[10, 11, 12])), Some(Value::ints(&[0]))));
    assert_eq!(carries[2], (Some(Value::ints(&[5])), Some(Value::ints(&[2, 0]))));
    assert!(!tests[2].success);
    assert_eq!(
        tests[0].outargs.as_ref().and_then(|out| out.get("toindex")),
        Some(&Value::ints(&[12, 10]))
    );

    let counts = catalog.tests("ListOffsetArray_counts_64").expect("plural group resolves");
    assert_eq!(
        counts[0].outargs.as_ref().and_then(|out| out.get("tocounts")),
        Some(&Value::ints(&[2, 0, 3]))
    );
}

#[test]
fn explicit_suites_filter_per_specialization() {
    let catalog = bundled_catalog(&OracleConfig::default_paths());

    let wide = catalog.unit_suite("ListArray_num_64").expect("suite");
    assert_eq!(wide.cases.len(), 3);
    let narrow = catalog.unit_suite("ListArray_num_U32").expect("suite");
    assert_eq!(narrow.cases.len(), 1);
    assert_eq!(narrow.dropped, 2);
    assert_eq!(narrow.cases[0].message.as_deref(), Some("stops[i] < starts[i]"));

    let carry = catalog.unit_suite("Index_carry_64").expect("suite");
    assert!(!carry.implemented);
    assert!(catalog.unit_suite("localindex_64").is_some());
    assert!(catalog.unit_suite("add_one_64").is_none());
}

#[test]
fn captures_roundtrip_and_verify() {
    let catalog = bundled_catalog(&OracleConfig::default_paths());
    let dir = scratch_dir("captures");

    let written = write_catalog_captures(&dir, &catalog).expect("captures written");
    assert_eq!(written.len(), 12);

    let capture = load_capture(&capture_path(&dir, "add_one_64")).expect("capture loads");
    assert_eq!(capture.status, "generated");
    assert_eq!(capture.case_count, 4);
    assert_eq!(capture.cases, catalog.tests("add_one_64").expect("generated").to_vec());

    let empty = load_capture(&capture_path(&dir, "localindex_64")).expect("capture loads");
    assert_eq!(empty.status, "no_tests");
    assert!(empty.cases.is_empty());

    let unit = load_unit_capture(&capture_path(&dir.join(EXPLICIT_CAPTURE_DIR), "Index_carry_64"))
        .expect("unit capture loads");
    assert!(!unit.implemented);

    let report = verify_catalog_captures(&dir, &catalog).expect("verification runs");
    assert!(report.all_matched(), "{report:?}");

    let rebuilt = bundled_catalog(&OracleConfig::default_paths());
    let again = verify_catalog_captures(&dir, &rebuilt).expect("verification runs");
    assert!(again.all_matched(), "regeneration must be identical: {again:?}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn verification_reports_drift_missing_and_stale() {
    let catalog = bundled_catalog(&OracleConfig::default_paths());
    let dir = scratch_dir("drift");
    write_catalog_captures(&dir, &catalog).expect("captures written");

    let path = capture_path(&dir, "checked_div_64");
    let mut capture = load_capture(&path).expect("capture loads");
    capture.cases.pop();
    write_capture(&path, &capture).expect("capture rewritten");

    fs::remove_file(capture_path(&dir, "add_one_64")).expect("capture removed");
    fs::write(capture_path(&dir, "retired_kernel_64"), "{}\n").expect("stale capture");

    let report = verify_catalog_captures(&dir, &catalog).expect("verification runs");
    assert!(!report.all_matched());
    assert_eq!(report.missing, vec!["add_one_64".to_string()]);
    assert_eq!(report.stale, vec!["retired_kernel_64".to_string()]);
    assert_eq!(report.drifted.len(), 1);
    assert_eq!(report.drifted[0].kernel, "checked_div_64");
    assert_eq!(report.drifted[0].expected_cases, 4);
    assert_eq!(report.drifted[0].actual_cases, 3);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn range_enforcement_can_be_relaxed() {
    let mut cfg = OracleConfig::default_paths();
    cfg.enforce_int_range = false;
    let relaxed = bundled_catalog(&cfg);
    let strict = bundled_catalog(&OracleConfig::default_paths());
    assert_eq!(relaxed.case_count(), strict.case_count());
    let stats = strict
        .specification("NumpyArray_scale_float64")
        .expect("generated")
        .stats();
    assert_eq!(stats.raw_combinations, 12);
    assert_eq!(stats.rejected_type, 10);
}
