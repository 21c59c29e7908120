//! `linkage run | validate | summarize`: config-driven record linkage.

use std::path::{Path, PathBuf};

use linkage_matcher::load::load_input;
use linkage_matcher::output::{read_summaries, write_artifacts};
use linkage_matcher::summary::{combine, describe};
use linkage_matcher::{LinkageSummary, MatchConfig, MatchError};

use crate::exit_codes::{
    linkage_exit_code, EXIT_LINKAGE_INVALID_CONFIG, EXIT_LINKAGE_OUTPUT, EXIT_LINKAGE_RUNTIME,
};
use crate::CliError;

fn linkage_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn engine_err(jurisdiction: &str, err: MatchError) -> CliError {
    let code = linkage_exit_code(&err);
    let hint = match err {
        MatchError::UnknownJurisdiction(_) => {
            Some("check the `jurisdictions` list in the config".to_string())
        }
        MatchError::MissingColumn { .. } => {
            Some("column names come from [policies.columns], [claims.columns] and [[attributes]]".to_string())
        }
        _ => None,
    };
    CliError { code, message: format!("{jurisdiction}: {err}"), hint }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| linkage_err(EXIT_LINKAGE_RUNTIME, format!("JSON serialization error: {e}")))
}

fn read_config(config_path: &Path) -> Result<MatchConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| linkage_err(EXIT_LINKAGE_RUNTIME, format!("cannot read config: {e}")))?;
    MatchConfig::from_toml(&config_str)
        .map_err(|e| linkage_err(EXIT_LINKAGE_INVALID_CONFIG, e.to_string()))
}

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(
    config_path: PathBuf,
    jurisdictions: Vec<String>,
    output_dir: Option<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let out_dir = output_dir.unwrap_or_else(|| base_dir.join(&config.output.dir));

    let codes = if jurisdictions.is_empty() {
        config.jurisdictions.clone()
    } else {
        jurisdictions
    };
    // Reject typos before any jurisdiction does work.
    for code in &codes {
        config.check_jurisdiction(code).map_err(|e| engine_err(code, e))?;
    }

    std::fs::create_dir_all(&out_dir).map_err(|e| {
        linkage_err(EXIT_LINKAGE_OUTPUT, format!("cannot create {}: {e}", out_dir.display()))
    })?;

    let mut summaries: Vec<LinkageSummary> = Vec::with_capacity(codes.len());
    for code in &codes {
        let input = load_input(&config, base_dir, code).map_err(|e| engine_err(code, e))?;
        let result = linkage_matcher::run(&config, code, &input).map_err(|e| engine_err(code, e))?;
        let dir = write_artifacts(&result, &out_dir).map_err(|e| {
            linkage_err(EXIT_LINKAGE_OUTPUT, format!("{code}: {e}"))
        })?;

        eprintln!("{}", describe(&result.summary));
        tracing::debug!(dir = %dir.display(), "jurisdiction complete");
        summaries.push(result.summary);
    }

    if json_output {
        println!("{}", to_json(&summaries)?);
    }
    eprintln!("wrote {}", out_dir.display());
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    eprintln!(
        "ok: \"{}\" ({} jurisdictions, {} attributes)",
        config.name,
        config.jurisdictions.len(),
        config.attributes.len(),
    );
    Ok(())
}

// ============================================================================
// summarize
// ============================================================================

#[derive(serde::Serialize)]
struct SummaryReport {
    jurisdictions: Vec<LinkageSummary>,
    total: LinkageSummary,
}

pub fn cmd_summarize(output_dir: PathBuf, json_output: bool) -> Result<(), CliError> {
    let summaries = read_summaries(&output_dir)
        .map_err(|e| linkage_err(EXIT_LINKAGE_RUNTIME, e.to_string()))?;
    if summaries.is_empty() {
        return Err(linkage_err(
            EXIT_LINKAGE_RUNTIME,
            format!("no jurisdiction summaries under {}", output_dir.display()),
        )
        .with_hint("run `linkage run <config>` first"));
    }

    let report = SummaryReport {
        total: combine(&summaries, "ALL"),
        jurisdictions: summaries,
    };

    if json_output {
        println!("{}", to_json(&report)?);
    } else {
        for s in &report.jurisdictions {
            println!("{}", describe(s));
        }
        println!("{}", describe(&report.total));
    }
    Ok(())
}
