#![forbid(unsafe_code)]

use crate::OracleCatalog;
use crate::explicit::UnitTestSuite;
use crate::record::TestCase;
use crate::specification::KernelSpecification;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const CAPTURE_SCHEMA_VERSION: u8 = 1;
/// Subdirectory of the capture root holding hand-written suites.
pub const EXPLICIT_CAPTURE_DIR: &str = "explicit";

/// On-disk form of one specialization's generated cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelTestCapture {
    pub schema_version: u8,
    pub kernel: String,
    pub templatized_kernel: String,
    pub status: String,
    pub case_count: usize,
    pub digest_sha256: String,
    pub cases: Vec<TestCase>,
}

impl KernelTestCapture {
    pub fn from_specification(spec: &KernelSpecification) -> Result<Self, String> {
        Ok(Self {
            schema_version: CAPTURE_SCHEMA_VERSION,
            kernel: spec.name().to_string(),
            templatized_kernel: spec.templatized_name().to_string(),
            status: spec.status().as_str().to_string(),
            case_count: spec.tests().len(),
            digest_sha256: cases_digest(spec.tests())?,
            cases: spec.tests().to_vec(),
        })
    }
}

/// On-disk form of one specialization's hand-written suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTestCapture {
    pub schema_version: u8,
    pub kernel: String,
    pub templatized_kernel: String,
    pub implemented: bool,
    pub case_count: usize,
    pub digest_sha256: String,
    pub cases: Vec<TestCase>,
}

impl UnitTestCapture {
    pub fn from_suite(suite: &UnitTestSuite) -> Result<Self, String> {
        Ok(Self {
            schema_version: CAPTURE_SCHEMA_VERSION,
            kernel: suite.kernel.clone(),
            templatized_kernel: suite.templatized_kernel.clone(),
            implemented: suite.implemented,
            case_count: suite.cases.len(),
            digest_sha256: cases_digest(&suite.cases)?,
            cases: suite.cases.clone(),
        })
    }
}

/// Hex SHA-256 of the compact JSON encoding of `cases`.
pub fn cases_digest(cases: &[TestCase]) -> Result<String, String> {
    let payload = serde_json::to_vec(cases)
        .map_err(|err| format!("failed serializing test cases: {err}"))?;
    Ok(sha256_hex(&payload))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

#[must_use]
pub fn capture_path(dir: &Path, kernel: &str) -> PathBuf {
    dir.join(format!("{kernel}.json"))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }
    let mut raw = serde_json::to_string_pretty(value)
        .map_err(|err| format!("failed serializing {}: {err}", path.display()))?;
    raw.push('\n');
    fs::write(path, raw).map_err(|err| format!("failed writing {}: {err}", path.display()))
}

pub fn write_capture(path: &Path, capture: &KernelTestCapture) -> Result<(), String> {
    write_json(path, capture)
}

pub fn load_capture(path: &Path) -> Result<KernelTestCapture, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|err| format!("invalid capture json {}: {err}", path.display()))
}

pub fn load_unit_capture(path: &Path) -> Result<UnitTestCapture, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|err| format!("invalid unit capture json {}: {err}", path.display()))
}

/// Writes one capture per generated specialization into `dir` and one per
/// hand-written suite into `dir/explicit`. Returns the written paths.
pub fn write_catalog_captures(dir: &Path, catalog: &OracleCatalog) -> Result<Vec<PathBuf>, String> {
    let mut written = Vec::new();
    for spec in catalog.specifications() {
        let path = capture_path(dir, spec.name());
        write_capture(&path, &KernelTestCapture::from_specification(spec)?)?;
        written.push(path);
    }
    let explicit_dir = dir.join(EXPLICIT_CAPTURE_DIR);
    for suite in catalog.unit_suites() {
        let path = capture_path(&explicit_dir, &suite.kernel);
        write_json(&path, &UnitTestCapture::from_suite(suite)?)?;
        written.push(path);
    }
    Ok(written)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureDrift {
    pub kernel: String,
    pub expected_digest: String,
    pub actual_digest: String,
    pub expected_cases: usize,
    pub actual_cases: usize,
}

/// Differences between freshly generated cases and the captures on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub total_kernels: usize,
    pub matched: usize,
    pub missing: Vec<String>,
    pub drifted: Vec<CaptureDrift>,
    /// Capture files with no counterpart in the catalog.
    pub stale: Vec<String>,
}

impl VerificationReport {
    #[must_use]
    pub fn all_matched(&self) -> bool {
        self.matched == self.total_kernels
            && self.missing.is_empty()
            && self.drifted.is_empty()
            && self.stale.is_empty()
    }
}

/// Compares `catalog` against the captures previously written to `dir`.
///
/// A capture has drifted when the digest recomputed from its stored cases
/// differs from the digest of the fresh cases.
pub fn verify_catalog_captures(
    dir: &Path,
    catalog: &OracleCatalog,
) -> Result<VerificationReport, String> {
    let mut report = VerificationReport::default();

    let mut expected = Vec::new();
    for spec in catalog.specifications() {
        expected.push((dir.to_path_buf(), spec.name().to_string(), spec.tests()));
    }
    let explicit_dir = dir.join(EXPLICIT_CAPTURE_DIR);
    for suite in catalog.unit_suites() {
        expected.push((explicit_dir.clone(), suite.kernel.clone(), suite.cases.as_slice()));
    }

    for (capture_dir, kernel, cases) in &expected {
        report.total_kernels += 1;
        let path = capture_path(capture_dir, kernel);
        if !path.is_file() {
            report.missing.push(display_name(dir, &path));
            continue;
        }
        let stored = load_stored_cases(&path)?;
        let expected_digest = cases_digest(cases)?;
        let actual_digest = cases_digest(&stored)?;
        if expected_digest == actual_digest {
            report.matched += 1;
        } else {
            report.drifted.push(CaptureDrift {
                kernel: display_name(dir, &path),
                expected_digest,
                actual_digest,
                expected_cases: cases.len(),
                actual_cases: stored.len(),
            });
        }
    }

    let known: BTreeSet<PathBuf> = expected
        .iter()
        .map(|(capture_dir, kernel, _)| capture_path(capture_dir, kernel))
        .collect();
    for capture_dir in [dir.to_path_buf(), explicit_dir] {
        for path in json_files(&capture_dir)? {
            if !known.contains(&path) {
                report.stale.push(display_name(dir, &path));
            }
        }
    }
    Ok(report)
}

#[derive(Deserialize)]
struct StoredCases {
    cases: Vec<TestCase>,
}

fn load_stored_cases(path: &Path) -> Result<Vec<TestCase>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
    let stored: StoredCases = serde_json::from_str(&raw)
        .map_err(|err| format!("invalid capture json {}: {err}", path.display()))?;
    Ok(stored.cases)
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries =
        fs::read_dir(dir).map_err(|err| format!("failed reading {}: {err}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|err| format!("failed reading {}: {err}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn display_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.with_extension("").display().to_string()
}

#[cfg(test)]
mod tests {
    use super::{cases_digest, sha256_hex};
    use crate::record::{ArgMap, TestCase};
    use kto_dtype::Value;

    fn case(x: i128) -> TestCase {
        let mut inargs = ArgMap::new();
        inargs.insert("x", Value::Int(x));
        TestCase {
            inargs,
            outargs: None,
            success: false,
            message: None,
        }
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_depends_on_case_order_and_content() {
        let forward = cases_digest(&[case(1), case(2)]).expect("digest");
        let again = cases_digest(&[case(1), case(2)]).expect("digest");
        let reversed = cases_digest(&[case(2), case(1)]).expect("digest");
        assert_eq!(forward, again);
        assert_ne!(forward, reversed);
        assert_eq!(forward.len(), 64);
    }
}
