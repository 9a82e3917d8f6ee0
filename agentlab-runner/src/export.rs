//! Artifact export: run manifest as JSON, action trace and indicator table
//! as CSV.
//!
//! Persisted manifests carry a `schema_version`; newer versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use agentlab_core::domain::PriceTable;
use agentlab_core::schema;

use crate::backtest::BacktestResult;
use crate::pipeline::{RunReport, SCHEMA_VERSION};

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Replay trace, one row per step.
///
/// Columns: step, date, close, action, position, reward, total_profit
pub fn export_actions_csv(result: &BacktestResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "step",
        "date",
        "close",
        "action",
        "position",
        "reward",
        "total_profit",
    ])?;
    for r in &result.trace {
        wtr.write_record([
            &r.step.to_string(),
            &r.timestamp.to_string(),
            &format!("{:.6}", r.close),
            &format!("{:?}", r.action),
            &format!("{:?}", r.position),
            &format!("{:.6}", r.reward),
            &format!("{:.6}", r.total_profit),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Full price table: Date, the OHLCV columns, then derived columns in
/// insertion order.
pub fn export_table_csv(table: &PriceTable) -> Result<String> {
    let names = table.column_names();
    let columns: Vec<_> = names
        .iter()
        .map(|n| {
            table
                .column(n)
                .with_context(|| format!("column '{n}' listed but absent"))
        })
        .collect::<Result<_>>()?;

    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec![schema::DATE.to_string()];
    header.extend(names.iter().cloned());
    wtr.write_record(&header)?;

    for (row, ts) in table.timestamps().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(ts.to_string());
        for (name, values) in names.iter().zip(&columns) {
            let v = values[row];
            record.push(if name.as_str() == schema::VOLUME {
                format!("{v:.0}")
            } else {
                format!("{v:.6}")
            });
        }
        wtr.write_record(&record)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for one run into `{symbol}_{timestamp}/` under
/// `output_dir`:
/// - `manifest.json`: the full `RunReport`
/// - `actions.csv`: replay trace
///
/// Returns the created directory.
pub fn save_artifacts(report: &RunReport, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        report.fingerprint.symbol,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_json(report)?)?;
    std::fs::write(run_dir.join("actions.csv"), export_actions_csv(&report.backtest)?)?;

    Ok(run_dir)
}

/// Load a `RunReport` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<RunReport> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::StepRecord;
    use crate::config::PipelineConfig;
    use crate::ppo::TrainingStats;
    use agentlab_core::domain::PriceBar;
    use agentlab_core::env::{Action, Position};
    use agentlab_core::fingerprint::RunFingerprint;
    use chrono::NaiveDate;

    fn table() -> PriceTable {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bar = PriceBar {
            timestamp: ts,
            open: 10.0,
            high: 11.0,
            low: 9.5,
            close: 10.5,
            volume: 1200,
        };
        let mut t = PriceTable::new("ACME", vec![bar]);
        t.insert_column("RSI", vec![55.5]).unwrap();
        t
    }

    fn report() -> RunReport {
        let table = table();
        let config = PipelineConfig::default();
        let ts = table.first_timestamp().unwrap();
        RunReport {
            schema_version: SCHEMA_VERSION,
            fingerprint: RunFingerprint::new(&table, &config, 42).unwrap(),
            config,
            training: TrainingStats::default(),
            backtest: BacktestResult {
                profit: 1.05,
                total_reward: 0.5,
                steps: 1,
                terminated: true,
                actions: vec![Action::Buy],
                positions: vec![Position::Long],
                trace: vec![StepRecord {
                    step: 0,
                    timestamp: ts,
                    close: 10.5,
                    action: Action::Buy,
                    position: Position::Long,
                    reward: 0.0,
                    total_profit: 1.05,
                }],
            },
            rows: 1,
            first: Some(ts),
            last: Some(ts),
        }
    }

    #[test]
    fn json_round_trip() {
        let report = report();
        let back = import_json(&export_json(&report).unwrap()).unwrap();
        assert_eq!(back, report);
        assert!((back.return_pct() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_future_schema() {
        let mut report = report();
        report.schema_version = SCHEMA_VERSION + 1;
        let json = serde_json::to_string(&report).unwrap();
        assert!(import_json(&json).is_err());
    }

    #[test]
    fn actions_csv_has_header_and_rows() {
        let csv = export_actions_csv(&report().backtest).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "step,date,close,action,position,reward,total_profit");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("0,2024-03-01 00:00:00,10.500000,Buy,Long,"));
    }

    #[test]
    fn table_csv_lists_every_column() {
        let csv = export_table_csv(&table()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,Open,High,Low,Close,Volume,RSI");
        assert_eq!(
            lines[1],
            "2024-03-01 00:00:00,10.000000,11.000000,9.500000,10.500000,1200,55.500000"
        );
    }

    #[test]
    fn save_and_load_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let report = report();
        let run_dir = save_artifacts(&report, dir.path()).unwrap();
        assert!(run_dir.join("actions.csv").exists());
        assert!(run_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("ACME_"));
        assert_eq!(load_artifacts(&run_dir).unwrap(), report);
    }
}
