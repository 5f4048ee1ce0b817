//! Command-line line recognition for PAGE-XML documents.
//!
//! ```text
//! linerec -i page1.xml -i page2.xml -o out/ -P model trocr-base-handwritten -P batch_size 16
//! linerec --image line.png -P model trocr-base-printed
//! ```

use clap::{ArgAction, Parser};
use linerec::core::config::RecognizeParameters;
use linerec::core::errors::{RecError, RecResult};
use linerec::core::traits::LineRecognizer;
use linerec::core::init_tracing;
use linerec::domain::{LineCrop, LineId, RegionId};
use linerec::models::RecognitionBackend;
use linerec::page::{PageDocument, read_page};
use linerec::pipeline::{
    CancellationToken, ErrorReason, Orchestrator, PrefetchRunner, Prepared, RunReport, RunSummary,
};
use linerec::processors::PixelRect;
use linerec::utils::load_image;
use serde_json::{Map, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Command-line arguments
#[derive(Parser)]
#[command(name = "linerec")]
#[command(about = "Recognize the text lines of PAGE-XML documents with an ONNX encoder-decoder model")]
struct Args {
    /// Input PAGE-XML files
    #[arg(short = 'i', long = "input")]
    inputs: Vec<PathBuf>,

    /// Output files, one per input, or a single existing directory
    #[arg(short = 'o', long = "output")]
    outputs: Vec<PathBuf>,

    /// Parameter as a KEY VALUE pair; may be repeated
    #[arg(short = 'P', long = "param", num_args = 2, value_names = ["KEY", "VALUE"], action = ArgAction::Append)]
    params: Vec<String>,

    /// JSON file with parameters; -P pairs override its entries
    #[arg(short = 'p', long = "parameters")]
    parameters: Option<PathBuf>,

    /// Print the effective parameters as JSON and exit
    #[arg(long)]
    dump_params: bool,

    /// Print version information and exit
    #[arg(long)]
    show_version: bool,

    /// Recognize a single line image and print its text and confidence
    #[arg(long)]
    image: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if args.show_version {
        println!(
            "linerec {} (cuda: {})",
            env!("CARGO_PKG_VERSION"),
            if cfg!(feature = "cuda") { "enabled" } else { "disabled" }
        );
        return Ok(ExitCode::SUCCESS);
    }

    let params = load_parameters(args.parameters.as_deref(), &args.params)?;
    if args.dump_params {
        println!("{}", serde_json::to_string_pretty(&params)?);
        return Ok(ExitCode::SUCCESS);
    }
    let (backend_config, pipeline_config) = params.into_configs()?;

    if let Some(image) = &args.image {
        let backend = RecognitionBackend::load(&backend_config)?;
        recognize_image(&backend, image)?;
        return Ok(ExitCode::SUCCESS);
    }

    if args.inputs.is_empty() {
        return Err("no input documents given (use -i)".into());
    }
    let jobs = pair_outputs(&args.inputs, &args.outputs)?;

    let backend = match RecognitionBackend::load(&backend_config) {
        Ok(backend) => backend,
        Err(e) => {
            // Nothing is written when the backend cannot be set up.
            error!("recognition backend unavailable: {}", e.chain_message());
            let mut summary = RunSummary::new();
            for (input, _) in &jobs {
                let report = RunReport::setup_failed(document_name(input), 0, &e);
                error!("{}", report);
                summary.record(&report);
            }
            info!("{}", summary);
            return Ok(ExitCode::FAILURE);
        }
    };

    let cancel = CancellationToken::new();
    watch_interrupt(cancel.clone(), async { tokio::signal::ctrl_c().await });
    let orchestrator = Orchestrator::new(pipeline_config.clone())?.with_cancellation(cancel.clone());
    let runner = PrefetchRunner::new(&pipeline_config).with_cancellation(cancel);

    let mut summary = RunSummary::new();
    let mut write_failures = 0usize;
    runner.run(jobs, load_document, |(input, output), prepared| {
        let report = match prepared {
            Ok(Prepared {
                mut document,
                extracted,
            }) => {
                let report =
                    orchestrator.process_extracted(&backend, document.layout_mut(), extracted);
                debug!(
                    "{}: {:.1} lines/s, {:?} per batch",
                    report.document_id,
                    report.lines_per_second(),
                    report.metrics.average_batch_time()
                );
                if report.is_done() || report.error_reason() == Some(ErrorReason::Cancelled) {
                    match document.write(&output) {
                        Ok(()) => info!("wrote {}", output.display()),
                        Err(e) => {
                            error!(
                                "failed to write {}: {}",
                                output.display(),
                                e.chain_message()
                            );
                            write_failures += 1;
                        }
                    }
                }
                report
            }
            Err(e) => RunReport::setup_failed(document_name(&input), 0, &e),
        };

        for diagnostic in &report.diagnostics {
            warn!("{}: {}", report.document_id, diagnostic);
        }
        if report.is_errored() {
            error!("{}", report);
        }
        summary.record(&report);
    });

    info!("{}", summary);
    if summary.has_errors() || write_failures > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Cancels `token` once `interrupt` resolves, from a background thread.
///
/// The current batch finishes; completed lines are still written.
fn watch_interrupt<F>(token: CancellationToken, interrupt: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name("linerec-interrupt".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("interrupt handling disabled: {}", e);
                    return;
                }
            };
            match runtime.block_on(interrupt) {
                Ok(()) => {
                    warn!("interrupt received, stopping after the current batch");
                    token.cancel();
                }
                Err(e) => warn!("interrupt handling disabled: {}", e),
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("interrupt handling disabled: {}", e);
            None
        }
    }
}

/// Merges the parameter file with `-P` pairs.
fn load_parameters(
    file: Option<&Path>,
    pairs: &[String],
) -> Result<RecognizeParameters, Box<dyn std::error::Error>> {
    let base = match file {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => Some(map),
                _ => return Err(format!("{} must contain a JSON object", path.display()).into()),
            }
        }
        None => None::<Map<String, Value>>,
    };
    let pairs = pairs
        .chunks(2)
        .filter_map(|pair| match pair {
            [key, value] => Some((key.as_str(), value.as_str())),
            _ => None,
        });
    Ok(RecognizeParameters::from_pairs(base, pairs)?)
}

/// Matches every input with its output location.
fn pair_outputs(
    inputs: &[PathBuf],
    outputs: &[PathBuf],
) -> Result<Vec<(PathBuf, PathBuf)>, Box<dyn std::error::Error>> {
    match outputs {
        [dir] if dir.is_dir() => Ok(inputs
            .iter()
            .map(|input| {
                let name = input.file_name().map(PathBuf::from).unwrap_or_else(|| input.clone());
                (input.clone(), dir.join(name))
            })
            .collect()),
        _ if outputs.len() == inputs.len() => {
            Ok(inputs.iter().cloned().zip(outputs.iter().cloned()).collect())
        }
        _ => Err(format!(
            "{} outputs given for {} inputs; pass one output per input or a single directory",
            outputs.len(),
            inputs.len()
        )
        .into()),
    }
}

fn load_document(
    (input, _): &(PathBuf, PathBuf),
) -> RecResult<(PageDocument, image::RgbImage)> {
    let page = read_page(input)?;
    let image_path = page.image_path().ok_or_else(|| {
        RecError::malformed_document(format!("{} has no imageFilename", input.display()))
    })?;
    let image = load_image(&image_path)?;
    Ok((page, image))
}

fn document_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn recognize_image(backend: &RecognitionBackend, path: &Path) -> RecResult<()> {
    let image = load_image(path)?;
    let (width, height) = image.dimensions();
    let crop = LineCrop::new(
        LineId::new(document_name(path)),
        RegionId::new("image"),
        image,
        PixelRect {
            x: 0,
            y: 0,
            width,
            height,
        },
    );
    let results = backend.recognize(std::slice::from_ref(&crop))?;
    for result in results {
        match result.confidence() {
            Some(confidence) => println!("{}\t{:.4}", result.text(), confidence),
            None => println!("{}\t-", result.text()),
        }
    }
    Ok(())
}
