#![forbid(unsafe_code)]

use kto_kernels::builtin_registry;
use kto_oracle::capture::write_catalog_captures;
use kto_oracle::fixtures::load_fixture_document;
use kto_oracle::{OracleCatalog, OracleConfig, set_generation_log_path};
use kto_spec::load_specification;
use std::path::PathBuf;

fn main() {
    if let Err(err) = run() {
        eprintln!("generate_kernel_tests failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut cfg = OracleConfig::default_paths();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--output-root" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--output-root requires a value".to_string())?;
                cfg.output_root = PathBuf::from(value);
            }
            "--log-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--log-path requires a value".to_string())?;
                set_generation_log_path(Some(PathBuf::from(value)));
            }
            "--no-int-range" => cfg.enforce_int_range = false,
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p kto-oracle --bin generate_kernel_tests -- [--output-root <dir>] [--log-path <path>] [--no-int-range]"
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    let declarations = load_specification(&cfg.spec_path)?;
    let fixtures = load_fixture_document(&cfg.fixture_path)?;
    let catalog = OracleCatalog::build(&declarations, &fixtures, &builtin_registry(), &cfg)?;
    let written = write_catalog_captures(&cfg.output_root, &catalog)?;

    for spec in catalog.specifications() {
        let stats = spec.stats();
        println!(
            "{}: status={} cases={} raw={} rejected={}",
            spec.name(),
            spec.status().as_str(),
            spec.tests().len(),
            stats.raw_combinations,
            stats.rejected()
        );
    }
    println!(
        "kernel tests: specializations={} cases={} explicit_suites={}",
        catalog.specifications().count(),
        catalog.case_count(),
        catalog.unit_suites().count()
    );
    println!("wrote {} captures under {}", written.len(), cfg.output_root.display());
    Ok(())
}
