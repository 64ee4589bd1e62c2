use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use log_merge::{LogError, LogMerger, MergeConfig, OutputKind};

#[derive(Parser, Debug)]
#[command(name = "log_merge")]
#[command(about = "Merges binary and text logs into one time-ordered log")]
struct Args {
    /// Replace the output files if they already exist
    #[arg(short = 'f', long)]
    force: bool,

    /// Compute and print times in UTC instead of local time
    #[arg(long)]
    utc: bool,

    /// Write a binary log plus a -meta.txt side file instead of text
    #[arg(long)]
    binary: bool,

    /// File to write the merged log to
    #[arg(short, long)]
    output: PathBuf,

    /// Log files, or directories whose files are all merged
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

impl Args {
    fn config(&self) -> MergeConfig {
        let output = if self.binary { OutputKind::Binary } else { OutputKind::Text };
        MergeConfig::default()
            .with_overwrite(self.force)
            .with_utc(self.utc)
            .with_output(output)
    }
}

/// Expands directories to the files directly inside them, leaving out the
/// output file so a rerun never reads its own result.
fn collect_inputs(inputs: &[PathBuf], output: &Path) -> std::io::Result<Vec<PathBuf>> {
    let output = fs::canonicalize(output).ok();
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries = Vec::new();
            for entry in fs::read_dir(input)? {
                let path = entry?.path();
                if path.is_file() {
                    entries.push(path);
                }
            }
            entries.sort();
            files.extend(entries);
        } else {
            files.push(input.clone());
        }
    }
    files.retain(|path| output.is_none() || fs::canonicalize(path).ok() != output);
    Ok(files)
}

fn run(args: Args) -> log_merge::Result<()> {
    let files = collect_inputs(&args.inputs, &args.output)?;
    info!(files = files.len(), output = %args.output.display(), "merging logs");

    let mut merger = LogMerger::new(args.config());
    let used = merger.add_files(&files)?;
    info!(used, skipped = files.len() - used, records = merger.lines().len(), "read inputs");

    merger.merge_into(&args.output)?;
    Ok(())
}

fn main() -> ExitCode {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .init();

    // Usage errors exit with status 2
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(LogError::File { path, source }) if source.kind() == ErrorKind::AlreadyExists => {
            error!(path = %path.display(), "output already exists, use --force to overwrite");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "merge failed");
            ExitCode::FAILURE
        }
    }
}
