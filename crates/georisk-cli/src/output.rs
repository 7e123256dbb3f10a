//! Report files: CSV, its JSON twin, and CSV to JSON conversion.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use georisk_core::{Report, ReportRow, RiskMatrix};

/// Label used in file names when every configured category ran.
const ALL_CATEGORIES: &str = "all";

/// `geopolitical_risk_report_<categories>_<YYYYmmdd_HHMMSS>.csv`
pub fn report_file_name(full: &RiskMatrix, report: &Report, at: DateTime<Utc>) -> String {
    let label = if report.category_ids.len() == full.categories().len() {
        ALL_CATEGORIES.to_string()
    } else {
        report.category_ids.join("-")
    };
    format!(
        "geopolitical_risk_report_{}_{}.csv",
        label,
        at.format("%Y%m%d_%H%M%S")
    )
}

pub fn write_csv(rows: &[ReportRow], path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json(rows: &[ReportRow], path: &Path) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, rows)?;
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_csv(path: &Path) -> anyhow::Result<Vec<ReportRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    reader
        .deserialize::<ReportRow>()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("invalid report row {}", i + 1)))
        .collect()
}

/// Convert a report CSV to a JSON array of row records. Returns the JSON path.
pub fn convert(csv_path: &Path, out: Option<&Path>) -> anyhow::Result<PathBuf> {
    let rows = read_csv(csv_path)?;
    let out = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| csv_path.with_extension("json"));
    write_json(&rows, &out)?;
    tracing::info!(rows = rows.len(), path = %out.display(), "Converted report");
    Ok(out)
}
