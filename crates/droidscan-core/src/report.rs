//! Output formatting for encode and prediction results.

use std::path::PathBuf;

use serde::Serialize;

use crate::dataset::Label;

/// Per-APK outcome of a batch encode run.
#[derive(Debug, Clone, Serialize)]
pub struct EncodeOutcome {
    pub apk: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-sample outcome of a prediction run.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    pub path: PathBuf,
    pub score: f32,
    pub is_malicious: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {s}. Use 'text' or 'json'.")),
        }
    }
}

pub fn print_encode_results(results: &[EncodeOutcome], format: OutputFormat) {
    match format {
        OutputFormat::Text => print_encode_text(results),
        OutputFormat::Json => print_encode_json(results),
    }
}

fn print_encode_text(results: &[EncodeOutcome]) {
    let errors: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    let encoded = results.len() - errors.len();

    println!("\n{}", "=".repeat(70));
    println!("ENCODE RESULTS");
    println!("{}", "=".repeat(70));

    if !errors.is_empty() {
        println!("\nFAILURES ({}):", errors.len());
        for r in &errors {
            let err = r.error.as_deref().unwrap_or("unknown");
            println!("  [ERR ] {} -- {}", r.apk.display(), err);
        }
    }

    println!("\nSUMMARY:");
    println!("  Total APKs:   {}", results.len());
    println!("  Encoded:      {encoded}");
    println!("  Failed:       {}", errors.len());
    println!("{}", "=".repeat(70));
}

fn print_encode_json(results: &[EncodeOutcome]) {
    let output = serde_json::json!({
        "results": results,
        "summary": {
            "total": results.len(),
            "encoded": results.iter().filter(|r| r.error.is_none()).count(),
            "failed": results.iter().filter(|r| r.error.is_some()).count(),
        }
    });
    println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
}

pub fn print_predictions(results: &[PredictionRecord], format: OutputFormat) {
    match format {
        OutputFormat::Text => print_predictions_text(results),
        OutputFormat::Json => print_predictions_json(results),
    }
}

fn print_predictions_text(results: &[PredictionRecord]) {
    let malicious: Vec<_> = results.iter().filter(|r| r.is_malicious).collect();
    let errors: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    let clean = results.len() - malicious.len() - errors.len();

    println!("\n{}", "=".repeat(70));
    println!("PREDICTION RESULTS");
    println!("{}", "=".repeat(70));

    if !malicious.is_empty() {
        println!("\nMALICIOUS ({}):", malicious.len());
        for r in &malicious {
            println!("  [{:.4}] {}", r.score, r.path.display());
        }
    }

    if !errors.is_empty() {
        println!("\nERRORS ({}):", errors.len());
        for r in &errors {
            let err = r.error.as_deref().unwrap_or("unknown");
            println!("  [ERR ] {} -- {}", r.path.display(), err);
        }
    }

    println!("\nSUMMARY:");
    println!("  Total samples: {}", results.len());
    println!("  Malicious:     {}", malicious.len());
    println!("  Clean:         {clean}");
    println!("  Errors:        {}", errors.len());
    println!("{}", "=".repeat(70));
}

fn print_predictions_json(results: &[PredictionRecord]) {
    let output = serde_json::json!({
        "results": results,
        "summary": {
            "total": results.len(),
            "malicious": results.iter().filter(|r| r.is_malicious).count(),
            "clean": results.iter().filter(|r| !r.is_malicious && r.error.is_none()).count(),
            "errors": results.iter().filter(|r| r.error.is_some()).count(),
        }
    });
    println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
}

/// Classification quality scores over a labeled evaluation run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Metrics {
    /// Compute from labeled predictions, malware being the positive
    /// class. Undefined ratios (empty denominators) come out as 0.
    pub fn from_predictions(records: &[PredictionRecord]) -> Metrics {
        let (mut tp, mut fp, mut tn, mut fne) = (0u64, 0u64, 0u64, 0u64);
        for r in records {
            let Some(label) = r.label else { continue };
            if r.error.is_some() {
                continue;
            }
            match (r.is_malicious, label.is_malware()) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fne += 1,
            }
        }
        Metrics::from_counts(tp, fp, tn, fne)
    }

    pub fn from_counts(tp: u64, fp: u64, tn: u64, fne: u64) -> Metrics {
        let total = tp + fp + tn + fne;
        let ratio = |num: u64, den: u64| {
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        };
        let accuracy = ratio(tp + tn, total);
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fne);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Metrics {
            accuracy,
            precision,
            recall,
            f1,
        }
    }
}

pub fn print_metrics(metrics: &Metrics, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            println!("\nSCORES:");
            println!("  Accuracy:  {:.4}", metrics.accuracy);
            println!("  Precision: {:.4}", metrics.precision);
            println!("  Recall:    {:.4}", metrics.recall);
            println!("  F1-score:  {:.4}", metrics.f1);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(metrics).unwrap_or_default()
            );
        }
    }
}
