#![forbid(unsafe_code)]

//! Test-oracle generation for array-manipulation kernels.
//!
//! Kernel declarations and a fixture corpus go in; per-specialization lists
//! of backend-agnostic [`TestCase`]s come out, produced by running reference
//! implementations over every fixture combination and filtering the results.

pub mod capture;
pub mod error;
pub mod executor;
pub mod explicit;
pub mod fixtures;
pub mod generator;
pub mod record;
pub mod specification;
pub mod validate;

pub use error::GenerationError;
pub use explicit::UnitTestSuite;
pub use fixtures::{FixtureCorpus, FixtureDocument};
pub use record::{ArgMap, TestCase};
pub use specification::{GenerationPolicy, GenerationStats, KernelSpecification, KernelStatus};

use crate::explicit::build_unit_suite;
use kto_spec::{KernelRegistry, SpecificationDocument};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

/// Kernels never given generated tests, whatever their declarations say.
pub const DEFAULT_EXCLUDED_KERNELS: [&str; 3] = [
    "NumpyArray_sort_asstrings_uint8",
    "argsort",
    "sort",
];

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub spec_path: PathBuf,
    pub fixture_path: PathBuf,
    pub output_root: PathBuf,
    pub enforce_int_range: bool,
    pub excluded_kernels: BTreeSet<String>,
}

impl OracleConfig {
    /// Bundled fixtures under this crate, with `KTO_SPEC_PATH`,
    /// `KTO_FIXTURE_PATH` and `KTO_OUTPUT_ROOT` taking precedence.
    #[must_use]
    pub fn default_paths() -> Self {
        let crate_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let repo_root = crate_root.join("../..");
        Self {
            spec_path: env_path(
                "KTO_SPEC_PATH",
                crate_root.join("fixtures/kernel_specification.json"),
            ),
            fixture_path: env_path(
                "KTO_FIXTURE_PATH",
                crate_root.join("fixtures/kernel_test_data.json"),
            ),
            output_root: env_path("KTO_OUTPUT_ROOT", repo_root.join("artifacts/kernel_tests")),
            enforce_int_range: true,
            excluded_kernels: DEFAULT_EXCLUDED_KERNELS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
        }
    }

    #[must_use]
    pub fn generation_policy(&self) -> GenerationPolicy {
        GenerationPolicy {
            enforce_int_range: self.enforce_int_range,
        }
    }

    #[must_use]
    pub fn is_excluded(&self, kernel: &str) -> bool {
        self.excluded_kernels.contains(kernel)
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

fn env_path(var: &str, fallback: PathBuf) -> PathBuf {
    std::env::var_os(var).map_or(fallback, PathBuf::from)
}

static GENERATION_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

pub fn set_generation_log_path(path: Option<PathBuf>) {
    let cell = GENERATION_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationLogEntry {
    pub kernel: String,
    pub templatized_kernel: String,
    pub status: KernelStatus,
    #[serde(flatten)]
    pub stats: GenerationStats,
    pub digest_sha256: String,
}

fn maybe_append_generation_log(entry: &GenerationLogEntry) -> Result<(), String> {
    let configured = GENERATION_LOG_PATH
        .get()
        .and_then(|cell| cell.lock().ok())
        .and_then(|slot| slot.clone());
    let from_env = std::env::var_os("KTO_GENERATION_LOG_PATH").map(PathBuf::from);
    let Some(path) = configured.or(from_env) else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(entry)
        .map_err(|err| format!("failed serializing generation log entry: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending generation log {}: {err}", path.display()))
}

/// Generated specifications and hand-written suites for every declared
/// specialization, keyed by specialization name.
#[derive(Debug, Clone, Default)]
pub struct OracleCatalog {
    generated: BTreeMap<String, KernelSpecification>,
    unit: BTreeMap<String, UnitTestSuite>,
}

impl OracleCatalog {
    /// Kernel groups without a reference implementation get no generated
    /// specification; blacklisted or excluded groups get one with no cases.
    /// Hand-written suites are built for every group that has a unit
    /// fixture.
    pub fn build(
        declarations: &SpecificationDocument,
        fixtures: &FixtureDocument,
        registry: &KernelRegistry,
        config: &OracleConfig,
    ) -> Result<Self, String> {
        let policy = config.generation_policy();
        let mut catalog = Self::default();
        for kernel in &declarations.kernels {
            let signatures = kernel
                .signatures()
                .map_err(|source| {
                    GenerationError::Spec {
                        kernel: kernel.name.clone(),
                        source,
                    }
                    .to_string()
                })?;
            let reference = registry.get(&kernel.name);
            let enabled = !kernel.is_blacklisted() && !config.is_excluded(&kernel.name);
            for signature in signatures {
                if let Some(fixture) = fixtures.unit_fixture(&kernel.name) {
                    let suite =
                        build_unit_suite(&signature, fixture).map_err(|err| err.to_string())?;
                    catalog.unit.insert(signature.name.clone(), suite);
                }
                let Some(reference) = reference else {
                    continue;
                };
                let spec = KernelSpecification::build(
                    signature,
                    reference,
                    &fixtures.corpus,
                    policy,
                    enabled,
                )
                .map_err(|err| err.to_string())?;
                maybe_append_generation_log(&GenerationLogEntry {
                    kernel: spec.name().to_string(),
                    templatized_kernel: spec.templatized_name().to_string(),
                    status: spec.status(),
                    stats: spec.stats(),
                    digest_sha256: capture::cases_digest(spec.tests())?,
                })?;
                catalog.generated.insert(spec.name().to_string(), spec);
            }
        }
        Ok(catalog)
    }

    #[must_use]
    pub fn specification(&self, name: &str) -> Option<&KernelSpecification> {
        self.generated.get(name)
    }

    pub fn specifications(&self) -> impl Iterator<Item = &KernelSpecification> {
        self.generated.values()
    }

    #[must_use]
    pub fn unit_suite(&self, name: &str) -> Option<&UnitTestSuite> {
        self.unit.get(name)
    }

    pub fn unit_suites(&self) -> impl Iterator<Item = &UnitTestSuite> {
        self.unit.values()
    }

    /// Generated cases of specialization `name`.
    #[must_use]
    pub fn tests(&self, name: &str) -> Option<&[TestCase]> {
        self.generated.get(name).map(KernelSpecification::tests)
    }

    #[must_use]
    pub fn case_count(&self) -> usize {
        self.generated.values().map(|spec| spec.tests().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_EXCLUDED_KERNELS, OracleCatalog, OracleConfig, set_generation_log_path};
    use crate::fixtures::parse_fixture_document;
    use kto_kernels::builtin_registry;
    use kto_spec::parse_specification;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    const DECLS: &str = r#"{"kernels": [
        {"name": "add_one", "automatic-tests": true, "specializations": [
            {"name": "add_one_64", "args": [
                {"name": "x", "type": "int64_t", "dir": "in"},
                {"name": "y", "type": "List[int64_t]", "dir": "out"}
            ]}
        ]},
        {"name": "localindex", "automatic-tests": false, "specializations": [
            {"name": "localindex_64", "args": [
                {"name": "toindex", "type": "List[int64_t]", "dir": "out"},
                {"name": "length", "type": "int64_t", "dir": "in"}
            ]}
        ]},
        {"name": "sort", "automatic-tests": true, "specializations": [
            {"name": "sort_64", "args": [
                {"name": "x", "type": "int64_t", "dir": "in"},
                {"name": "y", "type": "List[int64_t]", "dir": "out"}
            ]}
        ]},
        {"name": "unregistered", "automatic-tests": true, "specializations": [
            {"name": "unregistered_64", "args": [
                {"name": "x", "type": "int64_t", "dir": "in"}
            ]}
        ]}
    ]}"#;

    const FIXTURES: &str = r#"{
        "tests": {"num": [0, 1, 2]},
        "unit-tests": [
            {"name": "localindex", "status": true, "tests": [
                {"inputs": {"length": 2}, "outputs": {"toindex": [0, 1]}, "error": false}
            ]}
        ]
    }"#;

    fn catalog(config: &OracleConfig) -> OracleCatalog {
        let decls = parse_specification(DECLS).expect("declarations");
        let fixtures = parse_fixture_document(FIXTURES).expect("fixtures");
        let mut registry = builtin_registry();
        registry.register("sort", |args: &mut kto_spec::KernelArgs| {
            let x = args.int("x")?;
            args.write("y", 0, kto_dtype::Value::Int(x))
        });
        OracleCatalog::build(&decls, &fixtures, &registry, config).expect("catalog builds")
    }

    #[test]
    fn default_config_points_at_bundled_fixtures() {
        let cfg = OracleConfig::default_paths();
        assert!(cfg.enforce_int_range);
        for kernel in DEFAULT_EXCLUDED_KERNELS {
            assert!(cfg.is_excluded(kernel));
        }
        if std::env::var_os("KTO_SPEC_PATH").is_none() {
            assert!(cfg.spec_path.ends_with("fixtures/kernel_specification.json"));
        }
    }

    #[test]
    fn catalog_honours_blacklist_exclusions_and_registry() {
        let catalog = catalog(&OracleConfig::default_paths());

        assert_eq!(catalog.tests("add_one_64").map(<[_]>::len), Some(3));
        assert_eq!(catalog.tests("localindex_64").map(<[_]>::len), Some(0));
        assert_eq!(catalog.tests("sort_64").map(<[_]>::len), Some(0));
        assert!(catalog.specification("unregistered_64").is_none());
        assert_eq!(catalog.case_count(), 3);

        let suite = catalog.unit_suite("localindex_64").expect("explicit suite");
        assert_eq!(suite.cases.len(), 1);
        assert!(catalog.unit_suite("add_one_64").is_none());
    }

    #[test]
    fn exclusions_are_configurable() {
        let mut cfg = OracleConfig::default_paths();
        cfg.excluded_kernels.clear();
        let catalog = catalog(&cfg);
        assert_eq!(catalog.tests("sort_64").map(<[_]>::len), Some(3));
    }

    #[test]
    fn generation_log_writes_one_line_per_specialization() {
        // The log path is process-wide, so only lines for this kernel count.
        let decls = parse_specification(
            r#"{"kernels": [{"name": "log_marker", "automatic-tests": true, "specializations": [
                {"name": "log_marker_64", "args": [
                    {"name": "x", "type": "int64_t", "dir": "in"},
                    {"name": "y", "type": "List[int64_t]", "dir": "out"}
                ]},
                {"name": "log_marker_32", "args": [
                    {"name": "x", "type": "int32_t", "dir": "in"},
                    {"name": "y", "type": "List[int32_t]", "dir": "out"}
                ]}
            ]}]}"#,
        )
        .expect("declarations");
        let fixtures = parse_fixture_document(FIXTURES).expect("fixtures");
        let mut registry = builtin_registry();
        registry.register("log_marker", |args: &mut kto_spec::KernelArgs| {
            let x = args.int("x")?;
            args.write("y", 0, kto_dtype::Value::Int(x * 2))
        });

        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos());
        let path = std::env::temp_dir().join(format!("kto_generation_log_{ts}.jsonl"));
        set_generation_log_path(Some(path.clone()));
        let built = OracleCatalog::build(&decls, &fixtures, &registry, &OracleConfig::default_paths());
        set_generation_log_path(None);
        built.expect("catalog builds");

        let raw = fs::read_to_string(&path).expect("log written");
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .filter(|line: &serde_json::Value| line["templatized_kernel"] == "log_marker")
            .collect();
        let kernels: Vec<_> = lines.iter().map(|line| line["kernel"].clone()).collect();
        assert_eq!(kernels, vec!["log_marker_64", "log_marker_32"]);
        for line in &lines {
            assert_eq!(line["status"], "generated");
            assert_eq!(line["raw_combinations"], 3);
            assert_eq!(line["accepted"], 3);
            assert_eq!(line["digest_sha256"].as_str().map(str::len), Some(64));
        }
        let _ = fs::remove_file(&path);
    }
}
