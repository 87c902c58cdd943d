//! Multi-expiry batch driver
//!
//! For each expiry tag, looks for vendor files named
//! `OPT_<SYMBOL>_<tag>.csv` and `EQT_<SYMBOL>_<tag>.csv` and writes
//! `OPT_PINN_TRAIN_DATA_<tag>.mat` / `EQT_PINN_TRAIN_DATA_<tag>.mat`.

use std::path::{Path, PathBuf};

use super::config::PipelineConfig;
use super::equity::create_equity_mat;
use super::options::create_options_mat;
use super::report::TransformReport;
use crate::core::SurfaceResult;

/// Which transform produced an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Options,
    Equity,
}

/// Input and output locations for one batch run
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub expiries: Vec<String>,
    pub run_options: bool,
    pub run_equity: bool,
}

impl BatchPlan {
    pub fn new(expiries: Vec<String>) -> Self {
        Self {
            data_dir: PathBuf::from("."),
            out_dir: PathBuf::from("."),
            expiries,
            run_options: true,
            run_equity: true,
        }
    }

    pub fn options_input(&self, symbol: &str, expiry: &str) -> PathBuf {
        self.data_dir.join(format!("OPT_{}_{}.csv", symbol, expiry))
    }

    pub fn equity_input(&self, symbol: &str, expiry: &str) -> PathBuf {
        self.data_dir.join(format!("EQT_{}_{}.csv", symbol, expiry))
    }

    pub fn options_output(&self, expiry: &str) -> PathBuf {
        self.out_dir.join(format!("OPT_PINN_TRAIN_DATA_{}.mat", expiry))
    }

    pub fn equity_output(&self, expiry: &str) -> PathBuf {
        self.out_dir.join(format!("EQT_PINN_TRAIN_DATA_{}.mat", expiry))
    }
}

/// One written bundle
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub expiry: String,
    pub kind: BundleKind,
    pub path: PathBuf,
    pub report: TransformReport,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub written: Vec<BatchOutput>,
    /// Inputs that did not exist
    pub skipped: Vec<PathBuf>,
}

impl BatchSummary {
    pub fn log(&self) {
        tracing::info!(
            "Batch complete: {} file(s) written, {} input(s) missing",
            self.written.len(),
            self.skipped.len()
        );
        for out in &self.written {
            tracing::info!("  [{:?}] {} -> {}", out.kind, out.expiry, out.path.display());
        }
    }
}

fn present(path: &Path, summary: &mut BatchSummary) -> bool {
    if path.exists() {
        true
    } else {
        tracing::warn!("Skipping missing input {}", path.display());
        summary.skipped.push(path.to_path_buf());
        false
    }
}

/// Run every enabled transform for every expiry. A missing input is skipped;
/// any other failure aborts the run.
pub fn run_batch(plan: &BatchPlan, config: &PipelineConfig) -> SurfaceResult<BatchSummary> {
    let mut summary = BatchSummary::default();
    let symbol = config.symbol.as_str();

    for expiry in &plan.expiries {
        tracing::info!("Generating bundles for expiry {}", expiry);
        let equity_csv = plan.equity_input(symbol, expiry);

        if plan.run_options {
            let options_csv = plan.options_input(symbol, expiry);
            if present(&options_csv, &mut summary) {
                let spot = equity_csv.exists().then_some(equity_csv.as_path());
                if spot.is_none() {
                    tracing::warn!(
                        "No equity file for expiry {}; option rows use their own LTP as spot",
                        expiry
                    );
                }
                let output = plan.options_output(expiry);
                let report = create_options_mat(&options_csv, expiry, &output, spot, config)?;
                summary.written.push(BatchOutput {
                    expiry: expiry.clone(),
                    kind: BundleKind::Options,
                    path: output,
                    report,
                });
            }
        }

        if plan.run_equity && present(&equity_csv, &mut summary) {
            let output = plan.equity_output(expiry);
            let report = create_equity_mat(&equity_csv, expiry, &output, config)?;
            summary.written.push(BatchOutput {
                expiry: expiry.clone(),
                kind: BundleKind::Equity,
                path: output,
                report,
            });
        }
    }

    summary.log();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let mut plan = BatchPlan::new(vec!["20250529".to_string()]);
        plan.data_dir = PathBuf::from("in");
        plan.out_dir = PathBuf::from("out");

        assert_eq!(plan.options_input("RELIANCE", "20250529"), Path::new("in/OPT_RELIANCE_20250529.csv"));
        assert_eq!(plan.equity_input("RELIANCE", "20250529"), Path::new("in/EQT_RELIANCE_20250529.csv"));
        assert_eq!(plan.options_output("20250529"), Path::new("out/OPT_PINN_TRAIN_DATA_20250529.mat"));
        assert_eq!(plan.equity_output("20250529"), Path::new("out/EQT_PINN_TRAIN_DATA_20250529.mat"));
    }

    #[test]
    fn test_missing_inputs_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = BatchPlan::new(vec!["20250101".to_string()]);
        plan.data_dir = dir.path().to_path_buf();
        plan.out_dir = dir.path().to_path_buf();

        let summary = run_batch(&plan, &PipelineConfig::default()).unwrap();
        assert!(summary.written.is_empty());
        assert_eq!(summary.skipped.len(), 2);
    }
}
