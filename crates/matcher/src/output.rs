//! Artifact writing.
//!
//! A jurisdiction's tables are serialized into `<dir>/.XX.partial` and the
//! staging directory is renamed to `<dir>/XX` only once every file is on disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::MatchError;
use crate::model::{JurisdictionResult, LinkageSummary};

pub const SUMMARY_SUFFIX: &str = "_summary.json";

/// Final directory for one jurisdiction's artifacts.
pub fn jurisdiction_dir(out_dir: &Path, jurisdiction: &str) -> PathBuf {
    out_dir.join(jurisdiction)
}

fn staging_dir(out_dir: &Path, jurisdiction: &str) -> PathBuf {
    out_dir.join(format!(".{jurisdiction}.partial"))
}

fn io_err(path: &Path, e: std::io::Error) -> MatchError {
    MatchError::Io(format!("{}: {e}", path.display()))
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), MatchError> {
    let file = fs::File::create(path).map_err(|e| io_err(path, e))?;
    let mut writer = csv::Writer::from_writer(std::io::BufWriter::new(file));
    for row in rows {
        writer.serialize(row).map_err(|e| MatchError::Csv {
            source_name: path.display().to_string(),
            message: e.to_string(),
        })?;
    }
    writer.flush().map_err(|e| io_err(path, e))
}

/// Write every artifact for `result` and return the final directory.
pub fn write_artifacts(result: &JurisdictionResult, out_dir: &Path) -> Result<PathBuf, MatchError> {
    let code = result.jurisdiction.as_str();
    let staging = staging_dir(out_dir, code);
    let target = jurisdiction_dir(out_dir, code);

    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| io_err(&staging, e))?;
    }
    fs::create_dir_all(&staging).map_err(|e| io_err(&staging, e))?;

    let file = |suffix: &str| staging.join(format!("{code}{suffix}"));
    write_table(&file("_match_info.csv"), &result.renewal_matches)?;
    write_table(&file("_stint_info.csv"), &result.stints)?;
    write_table(&file("_selection_flow.csv"), &result.policy_flow)?;
    write_table(&file("_claim_match_info.csv"), &result.claim_matches)?;
    write_table(&file("_claim_selection_flow.csv"), &result.claim_flow)?;

    let summary_path = file(SUMMARY_SUFFIX);
    let mut json = serde_json::to_string_pretty(&result.summary)
        .map_err(|e| MatchError::Io(format!("summary serialization: {e}")))?;
    json.push('\n');
    fs::write(&summary_path, json).map_err(|e| io_err(&summary_path, e))?;

    if target.exists() {
        fs::remove_dir_all(&target).map_err(|e| io_err(&target, e))?;
    }
    fs::rename(&staging, &target).map_err(|e| io_err(&target, e))?;

    tracing::info!(jurisdiction = code, dir = %target.display(), "artifacts written");
    Ok(target)
}

/// Read every `XX/XX_summary.json` under `out_dir`, ordered by jurisdiction.
/// Staging directories are skipped.
pub fn read_summaries(out_dir: &Path) -> Result<Vec<LinkageSummary>, MatchError> {
    let entries = fs::read_dir(out_dir).map_err(|e| io_err(out_dir, e))?;
    let mut codes = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(out_dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        codes.push(name);
    }
    codes.sort();

    let mut summaries = Vec::with_capacity(codes.len());
    for code in codes {
        let path = out_dir.join(&code).join(format!("{code}{SUMMARY_SUFFIX}"));
        if !path.exists() {
            tracing::debug!(dir = %code, "no summary, skipping");
            continue;
        }
        let text = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let summary: LinkageSummary = serde_json::from_str(&text)
            .map_err(|e| MatchError::Io(format!("{}: {e}", path.display())))?;
        summaries.push(summary);
    }
    Ok(summaries)
}
