//! Static validation of a chain, before anything is sent.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use yapi_config::EnvSource;
use yapi_config::variables::find_refs;
use yapi_core::{ChainStep, ConfigV1};

use crate::diagnostic::Diagnostic;
use crate::position::{chain_entry_lines, chain_entry_range, find_value_line, find_value_line_in};
use crate::syntax::SyntaxChecker;

/// Name used for a step in messages, `#N` when it has none.
pub fn step_label(step: &ChainStep, index: usize) -> String {
    if step.name.is_empty() {
        format!("#{}", index + 1)
    } else {
        step.name.clone()
    }
}

/// Validate step names, URLs, cross-step references and assertions.
///
/// `text` is only used for positions and may be empty. A reference may only
/// name a step declared earlier; a dotted name that matches no step at all is
/// accepted when the environment defines it verbatim.
pub fn validate_chain(
    text: &str,
    base: &ConfigV1,
    steps: &[ChainStep],
    env: &EnvSource,
    jq: &dyn SyntaxChecker,
) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let entry_lines = chain_entry_lines(text);

    let mut name_counts: HashMap<&str, usize> = HashMap::new();
    for step in steps.iter().filter(|s| !s.name.is_empty()) {
        *name_counts.entry(step.name.as_str()).or_default() += 1;
    }
    let all_names: HashSet<&str> = name_counts.keys().copied().collect();
    let mut defined: HashSet<&str> = HashSet::new();

    for (i, step) in steps.iter().enumerate() {
        let step_line = entry_lines.get(i).copied();
        let range = chain_entry_range(text, i).unwrap_or(0..usize::MAX);
        let name = step.name.as_str();

        if name.is_empty() {
            diags.push(
                Diagnostic::error("", format!("step #{} missing 'name'", i + 1)).at_line(step_line),
            );
        } else if name_counts.get(name).copied().unwrap_or(0) > 1 {
            diags.push(
                Diagnostic::error(name, format!("duplicate step name '{name}'")).at_line(step_line),
            );
        }

        if step.config.url.trim().is_empty() && base.url.trim().is_empty() {
            diags.push(
                Diagnostic::error(
                    name,
                    format!("step '{name}' missing 'url' (not in step or base config)"),
                )
                .at_line(step_line),
            );
        }

        let label = step_label(step, i);
        // Base fields are sent with every step, so they are checked per step.
        for (field, value) in reference_fields(&base.merge(step)) {
            for r in find_refs(&value) {
                let Some(target) = r.step() else {
                    continue;
                };
                if defined.contains(target) {
                    continue;
                }
                let message = if target == name {
                    format!("step '{label}' cannot reference itself")
                } else if all_names.contains(target) {
                    format!("step '{label}' references '{target}' before it is defined")
                } else if env.contains(r.name) {
                    continue;
                } else {
                    format!("step '{label}' references unknown step '{target}'")
                };
                diags.push(
                    Diagnostic::error(format!("{label}.{field}"), message)
                        .at_line(value_line(text, r.token, &range)),
                );
            }
        }

        diags.extend(check_assertions(
            text,
            step.config.expect.assert.iter(),
            &format!("{label}.assert"),
            &range,
            jq,
        ));

        if !name.is_empty() {
            defined.insert(name);
        }
    }
    diags
}

/// One error per assertion `jq` rejects.
pub fn check_assertions<'a>(
    text: &str,
    assertions: impl Iterator<Item = &'a String>,
    field: &str,
    lines: &Range<usize>,
    jq: &dyn SyntaxChecker,
) -> Vec<Diagnostic> {
    assertions
        .filter_map(|assertion| {
            let err = jq.check(assertion).err()?;
            Some(
                Diagnostic::error(field, format!("JQ syntax error: {err}"))
                    .at_line(value_line(text, assertion, lines)),
            )
        })
        .collect()
}

/// Line of `needle`, preferring the given range.
fn value_line(text: &str, needle: &str, lines: &Range<usize>) -> Option<usize> {
    find_value_line_in(text, needle, lines.clone()).or_else(|| find_value_line(text, needle))
}

/// Every string a step may reference other steps from, with its field path.
fn reference_fields(config: &ConfigV1) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut scalar = |field: &str, value: &str| {
        if !value.is_empty() {
            out.push((field.to_string(), value.to_string()));
        }
    };
    scalar("url", &config.url);
    scalar("path", &config.path);
    scalar("json", &config.json);
    scalar("data", &config.data);
    scalar("delay", &config.delay);

    for (field, map) in [
        ("headers", &config.headers),
        ("query", &config.query),
        ("form", &config.form),
    ] {
        collect_map(field, map, &mut out);
    }
    if let Some(body) = &config.body {
        collect_value("body", &Value::Object(body.clone()), &mut out);
    }
    if let Some(variables) = &config.variables {
        collect_value("variables", &Value::Object(variables.clone()), &mut out);
    }
    out
}

fn collect_map(field: &str, map: &BTreeMap<String, String>, out: &mut Vec<(String, String)>) {
    for (key, value) in map {
        out.push((format!("{field}.{key}"), value.clone()));
    }
}

fn collect_value(path: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::String(s) => out.push((path.to_string(), s.clone())),
        Value::Object(map) => {
            for (key, v) in map {
                collect_value(&format!("{path}.{key}"), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                collect_value(&format!("{path}[{i}]"), v, out);
            }
        }
        _ => {}
    }
}
