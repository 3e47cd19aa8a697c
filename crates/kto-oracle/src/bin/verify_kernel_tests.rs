#![forbid(unsafe_code)]

use kto_kernels::builtin_registry;
use kto_oracle::capture::verify_catalog_captures;
use kto_oracle::fixtures::load_fixture_document;
use kto_oracle::{OracleCatalog, OracleConfig};
use kto_spec::load_specification;

fn main() {
    if let Err(err) = run() {
        eprintln!("verify_kernel_tests failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cfg = OracleConfig::default_paths();
    let declarations = load_specification(&cfg.spec_path)?;
    let fixtures = load_fixture_document(&cfg.fixture_path)?;
    let catalog = OracleCatalog::build(&declarations, &fixtures, &builtin_registry(), &cfg)?;
    let report = verify_catalog_captures(&cfg.output_root, &catalog)?;

    let report_json = serde_json::to_string_pretty(&report)
        .map_err(|err| format!("failed serializing verification report: {err}"))?;
    println!("{report_json}");

    if !report.all_matched() {
        std::process::exit(2);
    }
    Ok(())
}
