#![forbid(unsafe_code)]

use crate::error::GenerationError;
use crate::fixtures::{FixtureCorpus, GENERIC_FIXTURE_KEY};
use kto_dtype::Value;
use kto_spec::{Argument, KernelArgs, KernelSignature, ROLE_DELIMITER, Role};
use std::collections::BTreeMap;

/// Arguments bound together from a single fixture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGroup<'a> {
    /// Role group name, `None` for default-role arguments.
    pub group: Option<&'a str>,
    pub members: Vec<&'a Argument>,
}

/// Partitions arguments by role group, ordered by each group's first
/// declared member.
#[must_use]
pub fn role_groups(signature: &KernelSignature) -> Vec<RoleGroup<'_>> {
    let mut groups: Vec<RoleGroup<'_>> = Vec::new();
    for arg in &signature.args {
        let group = arg.role.group();
        match groups.iter_mut().find(|existing| existing.group == group) {
            Some(existing) => existing.members.push(arg),
            None => groups.push(RoleGroup {
                group,
                members: vec![arg],
            }),
        }
    }
    groups
}

/// `None` stands for an output accumulator.
type Assignment<'a> = Vec<(&'a Argument, Option<Value>)>;

/// Enumerates every argument binding for `signature`.
///
/// Each role group contributes one tuple per fixture instance; tuples are
/// combined across groups as a cartesian product with the first group
/// varying slowest. Default-role inputs advance together over the generic
/// values.
pub fn generate(
    signature: &KernelSignature,
    corpus: &FixtureCorpus,
) -> Result<Vec<KernelArgs>, GenerationError> {
    let mut combinations: Vec<Assignment<'_>> = vec![Vec::new()];
    for group in role_groups(signature) {
        let assignments = group_assignments(&signature.name, &group, corpus)?;
        combinations = combinations
            .iter()
            .flat_map(|prefix| {
                assignments.iter().map(move |assignment| {
                    let mut combined = prefix.clone();
                    combined.extend(assignment.iter().cloned());
                    combined
                })
            })
            .collect();
    }
    Ok(combinations
        .into_iter()
        .map(|assignment| bind(signature, assignment))
        .collect())
}

fn group_assignments<'a>(
    kernel: &str,
    group: &RoleGroup<'a>,
    corpus: &FixtureCorpus,
) -> Result<Vec<Assignment<'a>>, GenerationError> {
    match group.group {
        None => default_assignments(kernel, group, corpus),
        Some(name) => named_assignments(kernel, name, group, corpus),
    }
}

fn default_assignments<'a>(
    kernel: &str,
    group: &RoleGroup<'a>,
    corpus: &FixtureCorpus,
) -> Result<Vec<Assignment<'a>>, GenerationError> {
    if group.members.iter().all(|arg| arg.is_output()) {
        return Ok(vec![group.members.iter().map(|arg| (*arg, None)).collect()]);
    }
    let values = corpus
        .generic_values()?
        .ok_or_else(|| GenerationError::MissingFixture {
            kernel: kernel.to_string(),
            group: GENERIC_FIXTURE_KEY.to_string(),
        })?;
    Ok(values
        .iter()
        .map(|value| {
            group
                .members
                .iter()
                .map(|arg| (*arg, (!arg.is_output()).then(|| value.clone())))
                .collect()
        })
        .collect())
}

fn named_assignments<'a>(
    kernel: &str,
    name: &str,
    group: &RoleGroup<'a>,
    corpus: &FixtureCorpus,
) -> Result<Vec<Assignment<'a>>, GenerationError> {
    let (key, instances) =
        corpus
            .group_instances(name)
            .ok_or_else(|| GenerationError::MissingFixture {
                kernel: kernel.to_string(),
                group: name.to_string(),
            })??;
    instances
        .iter()
        .enumerate()
        .map(|(index, instance)| {
            group
                .members
                .iter()
                .map(|arg| {
                    if arg.is_output() {
                        return Ok((*arg, None));
                    }
                    let suffix = role_suffix(arg);
                    role_value(instance, key, suffix)
                        .map(|value| (*arg, Some(value.clone())))
                        .ok_or_else(|| GenerationError::MissingRoleValue {
                            kernel: kernel.to_string(),
                            argument: arg.name.clone(),
                            key: format!("{key}{ROLE_DELIMITER}{suffix}"),
                            instance: index,
                        })
                })
                .collect()
        })
        .collect()
}

fn role_suffix(arg: &Argument) -> &str {
    match &arg.role {
        Role::Grouped { suffix, .. } => suffix,
        Role::Default => &arg.name,
    }
}

/// `"{key}-{suffix}"`, falling back to a bare `suffix` key.
fn role_value<'v>(
    instance: &'v BTreeMap<String, Value>,
    key: &str,
    suffix: &str,
) -> Option<&'v Value> {
    instance
        .get(&format!("{key}{ROLE_DELIMITER}{suffix}"))
        .or_else(|| instance.get(suffix))
}

fn bind(signature: &KernelSignature, mut assignment: Assignment<'_>) -> KernelArgs {
    let mut args = KernelArgs::new();
    for arg in &signature.args {
        let value = assignment
            .iter()
            .position(|(assigned, _)| assigned.name == arg.name)
            .and_then(|slot| assignment.swap_remove(slot).1);
        match value {
            Some(value) => args.bind_input(&arg.name, value),
            None => args.bind_output(&arg.name),
        }
    }
    args
}
