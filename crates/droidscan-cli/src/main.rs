//! droidscan CLI - turns APKs into composite color images and scores
//! them with an ONNX convolutional classifier.
//!
//! Usage:
//!   droidscan encode app.apk
//!   droidscan batch /dataset/apks --out-dir /dataset/images --by-hash
//!   droidscan predict --model cnn.onnx sample.color.png other.apk
//!   droidscan eval --model cnn.onnx --images-root /dataset/images --round 1

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use droidscan_core::batch::{run_batch, BatchConfig, BatchProgress};
use droidscan_core::dataset::{image_path, load_split, Label, Split};
use droidscan_core::encode::{color_image_path, encode_apk};
use droidscan_core::inference::MalwareModel;
use droidscan_core::report::{
    print_encode_results, print_metrics, print_predictions, Metrics, OutputFormat,
    PredictionRecord,
};

#[derive(Parser)]
#[command(name = "droidscan")]
#[command(about = "Image-based Android malware detection pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode one APK into its composite color image
    Encode {
        /// Path to the APK
        apk: PathBuf,

        /// Destination directory (defaults to the APK's directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Also write per-section grayscale PNGs
        #[arg(long)]
        sections: bool,
    },

    /// Encode every APK under the given paths in parallel
    Batch {
        /// Paths to encode (APK files or directories)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Destination directory (defaults to each APK's directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Name outputs by SHA-256 of the APK contents
        #[arg(long)]
        by_hash: bool,

        /// Also write per-section grayscale PNGs
        #[arg(long)]
        sections: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Score composite images or APKs with a trained ONNX model
    Predict {
        /// Composite PNGs or APKs to score
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Path to the ONNX model file
        #[arg(short, long)]
        model: PathBuf,

        /// Maliciousness threshold (0.0-1.0)
        #[arg(short, long, default_value = "0.5")]
        threshold: f32,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Evaluate a model over a labeled split list
    Eval {
        /// Path to the ONNX model file
        #[arg(short, long)]
        model: PathBuf,

        /// Images root holding <hash>.color.png files and data_splits/
        #[arg(long)]
        images_root: PathBuf,

        /// Evaluation round number (selects e.g. test3.txt)
        #[arg(short, long, default_value = "1")]
        round: u32,

        /// Which split list to evaluate
        #[arg(short, long, default_value = "test")]
        split: Split,

        /// Maliciousness threshold (0.0-1.0)
        #[arg(short, long, default_value = "0.5")]
        threshold: f32,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Encode {
            apk,
            out_dir,
            sections,
        } => cmd_encode(&apk, out_dir.as_deref(), sections),
        Command::Batch {
            paths,
            out_dir,
            by_hash,
            sections,
            format,
        } => cmd_batch(paths, out_dir, by_hash, sections, format),
        Command::Predict {
            paths,
            model,
            threshold,
            format,
        } => cmd_predict(&paths, &model, threshold, format),
        Command::Eval {
            model,
            images_root,
            round,
            split,
            threshold,
            format,
        } => cmd_eval(&model, &images_root, round, split, threshold, format),
    }
}

/// Single-APK encode. Failures are reported, not propagated: the exit
/// code reflects the process, not a per-failure-kind code.
fn cmd_encode(apk: &std::path::Path, out_dir: Option<&std::path::Path>, sections: bool) -> Result<()> {
    let run = || -> Result<()> {
        let image = encode_apk(apk)?;
        let dest = color_image_path(apk, out_dir);
        image.save(&dest)?;
        if sections {
            let stem = droidscan_core::encode::apk_stem(apk);
            let dir = dest.parent().unwrap_or_else(|| std::path::Path::new("."));
            image.save_sections(dir, &stem)?;
        }
        Ok(())
    };

    match run() {
        Ok(()) => println!("Images successfully generated from {}", apk.display()),
        Err(e) => {
            eprintln!("[!] An exception occurred with: {}", apk.display());
            eprintln!("Exception: {e:#}");
        }
    }
    Ok(())
}

fn cmd_batch(
    paths: Vec<PathBuf>,
    out_dir: Option<PathBuf>,
    by_hash: bool,
    sections: bool,
    format: OutputFormat,
) -> Result<()> {
    let config = BatchConfig {
        target_paths: paths,
        out_dir,
        by_hash,
        write_sections: sections,
    };
    let progress = Arc::new(BatchProgress::new());

    eprintln!("[*] Encoding...");
    let results = run_batch(&config, &progress)?;

    let total = progress.total_apks.load(Ordering::Relaxed);
    eprintln!("[*] Processed {} APKs", total);

    if results.is_empty() {
        eprintln!("[*] No APKs to encode.");
        return Ok(());
    }

    print_encode_results(&results, format);
    Ok(())
}

fn cmd_predict(
    paths: &[PathBuf],
    model_path: &std::path::Path,
    threshold: f32,
    format: OutputFormat,
) -> Result<()> {
    eprintln!("[*] Loading model from {}...", model_path.display());
    let model = MalwareModel::load(model_path)?;

    eprintln!("[*] Scoring {} samples...", paths.len());
    let results: Vec<PredictionRecord> = paths
        .iter()
        .map(|path| {
            let is_apk = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("apk"));
            let scored = if is_apk {
                encode_apk(path)
                    .map_err(anyhow::Error::from)
                    .and_then(|image| model.score_composite(&image))
            } else {
                model.score_image(path)
            };
            match scored {
                Ok(score) => PredictionRecord {
                    path: path.clone(),
                    score,
                    is_malicious: score >= threshold,
                    label: None,
                    error: None,
                },
                Err(e) => PredictionRecord {
                    path: path.clone(),
                    score: 0.0,
                    is_malicious: false,
                    label: None,
                    error: Some(format!("{e:#}")),
                },
            }
        })
        .collect();

    print_predictions(&results, format);
    Ok(())
}

fn cmd_eval(
    model_path: &std::path::Path,
    images_root: &std::path::Path,
    round: u32,
    split: Split,
    threshold: f32,
    format: OutputFormat,
) -> Result<()> {
    eprintln!("[*] Loading model from {}...", model_path.display());
    let model = MalwareModel::load(model_path)?;

    let hashes = load_split(images_root, split, round)?;
    eprintln!("[*] Evaluating {} samples...", hashes.len());

    let results: Vec<PredictionRecord> = hashes
        .iter()
        .map(|hash| {
            let path = image_path(images_root, hash);
            let label = Label::from_path(&path);
            match model.score_image(&path) {
                Ok(score) => PredictionRecord {
                    path,
                    score,
                    is_malicious: score >= threshold,
                    label: Some(label),
                    error: None,
                },
                Err(e) => PredictionRecord {
                    path,
                    score: 0.0,
                    is_malicious: false,
                    label: Some(label),
                    error: Some(format!("{e:#}")),
                },
            }
        })
        .collect();

    print_predictions(&results, format);
    print_metrics(&Metrics::from_predictions(&results), format);
    Ok(())
}
