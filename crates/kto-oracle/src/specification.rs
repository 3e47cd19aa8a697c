#![forbid(unsafe_code)]

use crate::error::GenerationError;
use crate::executor::{Execution, execute};
use crate::fixtures::FixtureCorpus;
use crate::generator::generate;
use crate::record::TestCase;
use crate::validate::{Rejection, inputs_conform, validate_generated};
use kto_spec::{Argument, KernelSignature, ReferenceFn};
use serde::Serialize;

/// Knobs that change which generated cases survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationPolicy {
    pub enforce_int_range: bool,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            enforce_int_range: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelStatus {
    Generated,
    NoTests,
}

impl KernelStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::NoTests => "no_tests",
        }
    }
}

/// Counters for one kernel's generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub raw_combinations: usize,
    pub accepted: usize,
    pub domain_errors: usize,
    pub rejected_type: usize,
    pub rejected_overflow: usize,
    pub rejected_range: usize,
}

impl GenerationStats {
    fn reject(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Type => self.rejected_type += 1,
            Rejection::Overflow => self.rejected_overflow += 1,
            Rejection::Range => self.rejected_range += 1,
        }
    }

    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected_type + self.rejected_overflow + self.rejected_range
    }
}

/// A specialization together with its generated test cases.
///
/// Cases are produced once, at construction; reading them never re-runs the
/// reference kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSpecification {
    signature: KernelSignature,
    enabled: bool,
    tests: Vec<TestCase>,
    stats: GenerationStats,
}

impl KernelSpecification {
    /// Generates, executes and filters every fixture combination for an
    /// enabled kernel. A disabled kernel gets an empty case list and never
    /// touches the corpus.
    pub fn build(
        signature: KernelSignature,
        reference: &ReferenceFn,
        corpus: &FixtureCorpus,
        policy: GenerationPolicy,
        enabled: bool,
    ) -> Result<Self, GenerationError> {
        let mut stats = GenerationStats::default();
        let mut tests = Vec::new();
        if enabled {
            let combinations = generate(&signature, corpus)?;
            stats.raw_combinations = combinations.len();
            for bound in &combinations {
                if !inputs_conform(&signature, bound) {
                    stats.reject(Rejection::Type);
                    continue;
                }
                let execution = execute(&signature, reference, bound)?;
                let domain_error = matches!(execution, Execution::DomainError { .. });
                let case = execution.into_case();
                match validate_generated(&signature, &case, policy.enforce_int_range) {
                    Ok(()) => {
                        stats.accepted += 1;
                        if domain_error {
                            stats.domain_errors += 1;
                        }
                        tests.push(case);
                    }
                    Err(rejection) => stats.reject(rejection),
                }
            }
        }
        Ok(Self {
            signature,
            enabled,
            tests,
            stats,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    #[must_use]
    pub fn templatized_name(&self) -> &str {
        &self.signature.templatized_name
    }

    #[must_use]
    pub fn args(&self) -> &[Argument] {
        &self.signature.args
    }

    #[must_use]
    pub fn signature(&self) -> &KernelSignature {
        &self.signature
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    #[must_use]
    pub fn stats(&self) -> GenerationStats {
        self.stats
    }

    #[must_use]
    pub fn status(&self) -> KernelStatus {
        if self.tests.is_empty() {
            KernelStatus::NoTests
        } else {
            KernelStatus::Generated
        }
    }
}
