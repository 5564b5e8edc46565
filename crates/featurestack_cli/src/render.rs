//! Output rendering for the CLI.

use clap::ValueEnum;
use featurestack_plan::{CompileError, CompiledPlan, CompilerWarning, PlanDocument};
use featurestack_runtime::{EmissionError, EmissionOutcome};
use serde::Serialize;
use std::fmt::Write;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// JSON
    Json,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    fingerprint: String,
    warnings: &'a [CompilerWarning],
    plan: PlanDocument<'a>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ValidationReport<'a> {
    Valid {
        definitions: usize,
        warnings: &'a [CompilerWarning],
    },
    Invalid {
        errors: &'a CompileError,
    },
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ApplyReport<'a> {
    Applied {
        #[serde(flatten)]
        outcome: &'a EmissionOutcome,
    },
    Failed {
        #[serde(flatten)]
        error: &'a EmissionError,
    },
}

fn json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

fn warnings(out: &mut String, warnings: &[CompilerWarning]) {
    for warning in warnings {
        let _ = writeln!(out, "warning: {}", warning);
    }
}

/// Render a validation result
///
/// # Errors
///
/// Returns error if JSON encoding fails
pub fn validation(format: Format, result: &Result<CompiledPlan, CompileError>) -> serde_json::Result<String> {
    match format {
        Format::Json => match result {
            Ok(plan) => json(&ValidationReport::Valid {
                definitions: plan.len(),
                warnings: plan.warnings(),
            }),
            Err(errors) => json(&ValidationReport::Invalid { errors }),
        },
        Format::Text => {
            let mut out = String::new();
            match result {
                Ok(plan) => {
                    warnings(&mut out, plan.warnings());
                    let _ = writeln!(out, "ok: {} definition(s) valid", plan.len());
                }
                Err(errors) => {
                    let _ = writeln!(out, "{}", errors);
                }
            }
            Ok(out)
        }
    }
}

/// Render a compiled plan
///
/// # Errors
///
/// Returns error if the plan cannot be encoded
pub fn plan(format: Format, plan: &CompiledPlan) -> color_eyre::Result<String> {
    let fingerprint = plan.fingerprint()?.to_hex();
    let document = plan.document();

    match format {
        Format::Json => Ok(json(&PlanReport {
            fingerprint,
            warnings: plan.warnings(),
            plan: document,
        })?),
        Format::Text => {
            let mut out = String::new();
            warnings(&mut out, plan.warnings());
            let _ = writeln!(out, "plan: {} step(s), fingerprint {}", document.steps.len(), fingerprint);
            for step in &document.steps {
                let _ = write!(out, "{:>4}  {:<11} {}", step.position + 1, step.kind.as_str(), step.id);
                if !step.depends_on.is_empty() {
                    let deps: Vec<&str> = step.depends_on.iter().map(|d| d.as_str()).collect();
                    let _ = write!(out, "  <- {}", deps.join(", "));
                }
                out.push('\n');
            }
            Ok(out)
        }
    }
}

/// Render an emission result
///
/// # Errors
///
/// Returns error if JSON encoding fails
pub fn apply(format: Format, result: &Result<EmissionOutcome, EmissionError>) -> serde_json::Result<String> {
    match format {
        Format::Json => match result {
            Ok(outcome) => json(&ApplyReport::Applied { outcome }),
            Err(error) => json(&ApplyReport::Failed { error }),
        },
        Format::Text => {
            let mut out = String::new();
            let emitted = match result {
                Ok(outcome) => &outcome.resources,
                Err(error) => &error.emitted,
            };
            for (id, backend_id) in emitted {
                let _ = writeln!(out, "emitted {} -> {}", id, backend_id);
            }
            if let Err(error) = result {
                let _ = writeln!(out, "{}", error);
            }
            Ok(out)
        }
    }
}
