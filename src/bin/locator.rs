//! Locator command-line driver.
//!
//! Three modes: `single` locates one input file, `batch` drains an input
//! directory, and `service` runs the HTTP API. Requests and results can
//! be JSON or the legacy hydra text format.
//!
//! ```bash
//! locator --mode=single --modelPath=./models --inputType=json \
//!     --filePath=./event.locrequest
//! locator --mode=batch --modelPath=./models --inputDir=./input \
//!     --outputDir=./output --archiveDir=./archive
//! locator --mode=service --modelPath=./models
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn, Level};

use hypolocator::io::request::{LocationRequest, LocationResult};
use hypolocator::io::hydra;
use hypolocator::refdata::{AuxData, Cratons, ZoneStats};
use hypolocator::solver::Locator;
use hypolocator::traveltime::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Single,
    Batch,
    Service,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FileType {
    Json,
    Hydra,
}

#[derive(Debug, Parser)]
#[command(name = "locator", version, about = "Iterative seismic event locator")]
struct Args {
    #[arg(long, value_enum, default_value = "single")]
    mode: Mode,

    /// Directory holding the model files (reference data, travel-time
    /// tables)
    #[arg(long = "modelPath", default_value = "./models")]
    model_path: PathBuf,

    /// Input file for single mode
    #[arg(long = "filePath")]
    file_path: Option<PathBuf>,

    /// Input directory for batch mode
    #[arg(long = "inputDir", default_value = "./input")]
    input_dir: PathBuf,

    /// Output directory for batch mode
    #[arg(long = "outputDir", default_value = "./output")]
    output_dir: PathBuf,

    /// Archive directory for processed batch inputs (inputs are deleted
    /// when absent)
    #[arg(long = "archiveDir")]
    archive_dir: Option<PathBuf>,

    #[arg(long = "inputType", value_enum, default_value = "hydra")]
    input_type: FileType,

    /// Output format; defaults to the input format
    #[arg(long = "outputType", value_enum)]
    output_type: Option<FileType>,

    /// Directory to write the log file to
    #[arg(long = "logPath")]
    log_path: Option<PathBuf>,

    #[arg(long = "logLevel", default_value = "info")]
    log_level: String,

    /// CSV summary file appended to after each location
    #[arg(long = "csvFile")]
    csv_file: Option<PathBuf>,

    /// Earth model to load travel-time tables for
    #[arg(long = "earthModel", default_value = "ak135")]
    earth_model: String,

    /// Bind address for service mode
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,
}

fn main() {
    let args = Args::parse();
    if let Err(error) = run(args) {
        // The subscriber may not be up yet; stderr always is.
        eprintln!("locator: {error:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    setup_logging(&args)?;
    info!(version = env!("CARGO_PKG_VERSION"), "locator starting");

    let locator = build_locator(&args)?;
    let input_type = args.input_type;
    let output_type = args.output_type.unwrap_or(input_type);

    match args.mode {
        Mode::Single => {
            let file_path = args
                .file_path
                .as_ref()
                .ok_or_else(|| anyhow!("--filePath is required in single mode"))?;
            locate_file(
                &locator,
                file_path,
                Path::new("./"),
                input_type,
                output_type,
                args.csv_file.as_deref(),
            )
        }
        Mode::Batch => locate_directory(&locator, &args, input_type, output_type),
        Mode::Service => serve(locator, &args.bind),
    }
}

fn setup_logging(args: &Args) -> anyhow::Result<()> {
    let level: Level = args
        .log_level
        .parse()
        .map_err(|_| anyhow!("unresolved log level {}", args.log_level))?;

    match &args.log_path {
        Some(log_path) => {
            fs::create_dir_all(log_path)
                .with_context(|| format!("creating log directory {}", log_path.display()))?;
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path.join("locator.log"))?;
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_target(true)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_target(true)
                .init();
        }
    }
    Ok(())
}

fn build_locator(args: &Args) -> anyhow::Result<Locator> {
    let aux = match AuxData::load(&args.model_path) {
        Ok(aux) => aux,
        Err(error) => {
            warn!(
                %error,
                path = %args.model_path.display(),
                "reference data unavailable, continuing without cratons or zone statistics"
            );
            Arc::new(AuxData::new(Cratons::default(), ZoneStats::empty()))
        }
    };
    let model = tables::load_model(&args.model_path, &args.earth_model)?;
    Ok(Locator::new(aux, model))
}

/// File extensions by type, matching the legacy conventions.
fn extensions(file_type: FileType) -> (&'static str, &'static str) {
    match file_type {
        FileType::Json => (".locrequest", ".locresult"),
        FileType::Hydra => (".txt", ".out"),
    }
}

fn read_request(path: &Path, input_type: FileType) -> anyhow::Result<LocationRequest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading input file {}", path.display()))?;
    let request = match input_type {
        FileType::Json => LocationRequest::from_json(&text)?,
        FileType::Hydra => hydra::parse_request(&text)?,
    };
    Ok(request)
}

fn write_result(
    result: &LocationResult,
    output_path: &Path,
    output_type: FileType,
) -> anyhow::Result<()> {
    let text = match output_type {
        FileType::Json => result.to_json()?,
        FileType::Hydra => hydra::write_result(result),
    };
    fs::write(output_path, text)
        .with_context(|| format!("writing result file {}", output_path.display()))?;
    Ok(())
}

fn locate_file(
    locator: &Locator,
    file_path: &Path,
    output_dir: &Path,
    input_type: FileType,
    output_type: FileType,
    csv_file: Option<&Path>,
) -> anyhow::Result<()> {
    let request = read_request(file_path, input_type)?;
    let result = locator.locate(&request)?;
    info!(
        exit = %result.exit_code,
        latitude = result.hypocenter.latitude,
        longitude = result.hypocenter.longitude,
        depth = result.hypocenter.depth,
        "located {}",
        file_path.display()
    );

    let stem = file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("event");
    let (_, output_extension) = extensions(output_type);
    let output_path = output_dir.join(format!("{stem}{output_extension}"));
    write_result(&result, &output_path, output_type)?;

    if let Some(csv_path) = csv_file {
        use std::io::Write;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(csv_path)?;
        writeln!(file, "{}", result.to_csv())?;
    }
    Ok(())
}

fn locate_directory(
    locator: &Locator,
    args: &Args,
    input_type: FileType,
    output_type: FileType,
) -> anyhow::Result<()> {
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating output directory {}", args.output_dir.display()))?;
    if let Some(archive_dir) = &args.archive_dir {
        fs::create_dir_all(archive_dir)
            .with_context(|| format!("creating archive directory {}", archive_dir.display()))?;
    }

    let (input_extension, _) = extensions(input_type);
    let mut entries: Vec<PathBuf> = fs::read_dir(&args.input_dir)
        .with_context(|| format!("reading input directory {}", args.input_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(input_extension))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();

    for path in entries {
        match locate_file(
            locator,
            &path,
            &args.output_dir,
            input_type,
            output_type,
            args.csv_file.as_deref(),
        ) {
            Ok(()) => match &args.archive_dir {
                Some(archive_dir) => {
                    let target = archive_dir.join(path.file_name().unwrap_or_default());
                    fs::rename(&path, target)?;
                }
                None => fs::remove_file(&path)?,
            },
            Err(error) => {
                // Rename the failed input so it isn't retried forever.
                error!(%error, "failed to locate {}", path.display());
                let mut failed = path.clone().into_os_string();
                failed.push(".error");
                let _ = fs::rename(&path, failed);
            }
        }
    }
    Ok(())
}

#[cfg(feature = "http-server")]
fn serve(locator: Locator, bind: &str) -> anyhow::Result<()> {
    use hypolocator::http::{create_router, AppState};

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let state = AppState::new(Arc::new(locator));
        let app = create_router(state);
        let listener = tokio::net::TcpListener::bind(bind).await?;
        info!("locator service listening on http://{bind}");
        axum::serve(listener, app).await?;
        Ok(())
    })
}

#[cfg(not(feature = "http-server"))]
fn serve(_locator: Locator, _bind: &str) -> anyhow::Result<()> {
    Err(anyhow!("service mode requires the http-server feature"))
}
