//! Driver that merges a set of log files into one output.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::collection::LogLineCollection;
use crate::config::{MergeConfig, OutputKind};
use crate::error::{LogError, Result};
use crate::output::{BinaryOutput, LogOutput, TextOutput};
use crate::record::LogLine;
use crate::source::LogSource;

const SERIAL_MARKER: &str = "serialNo";

/// Upper bound on threads reading inputs at once.
pub const MAX_READERS: usize = 8;

/// What was taken from one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    /// File name without its directory.
    pub name: String,
    /// Digits following `serialNo=` in the file's first record.
    pub serial_number: Option<u64>,
    /// Records added to the merge.
    pub records: usize,
}

/// A file read to the end, not yet added to the merge.
struct Ingested {
    summary: SourceSummary,
    version: Option<String>,
    first_time: Option<DateTime<Utc>>,
    lines: Vec<LogLine>,
}

/// Reads log files, merges their records by time and writes the result
/// behind a metadata block describing the inputs.
pub struct LogMerger {
    config: MergeConfig,
    lines: LogLineCollection,
    files: Vec<SourceSummary>,
    versions: Vec<String>,
    earliest_start: Option<DateTime<Utc>>,
}

impl LogMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self {
            config,
            lines: LogLineCollection::new(),
            files: Vec::new(),
            versions: Vec::new(),
            earliest_start: None,
        }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Reads one file. Returns `false` when it was skipped because it is
    /// not a log.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let ingested = ingest(path.as_ref(), &self.config)?;
        Ok(self.absorb(ingested))
    }

    /// Reads several files on up to `MAX_READERS` threads and adds them in
    /// the order given. Returns how many were logs.
    ///
    /// # Errors
    ///
    /// The first failure in input order; nothing is added in that case.
    pub fn add_files<P: AsRef<Path> + Sync>(&mut self, paths: &[P]) -> Result<usize> {
        let config = &self.config;
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<Result<Option<Ingested>>>>> = Mutex::new(paths.iter().map(|_| None).collect());

        let readers = paths.len().min(MAX_READERS);
        debug!(files = paths.len(), readers, "reading inputs");
        let (next, slots_ref) = (&next, &slots);
        thread::scope(|scope| {
            let handles: Vec<_> = (0..readers)
                .map(|_| {
                    scope.spawn(move || {
                        // Each reader claims the next unread index until none are left
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(path) = paths.get(index) else {
                                break;
                            };
                            let result = ingest(path.as_ref(), config);
                            slots_ref.lock()[index] = Some(result);
                        }
                    })
                })
                .collect();
            for handle in handles {
                if let Err(panic) = handle.join() {
                    std::panic::resume_unwind(panic);
                }
            }
        });

        let ingested = slots.into_inner().into_iter().flatten().collect::<Result<Vec<_>>>()?;
        let mut added = 0;
        for file in ingested {
            if self.absorb(file) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Inputs that were merged, in the order they were added.
    pub fn files(&self) -> &[SourceSummary] {
        &self.files
    }

    /// Distinct version banners seen at the top of the inputs.
    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    /// Time of the earliest first record across all inputs.
    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.earliest_start
    }

    pub fn lines(&mut self) -> &mut LogLineCollection {
        &mut self.lines
    }

    /// Creates the output file for `config.output` at `path`.
    ///
    /// Binary output needs the merge session, so the records are normalized
    /// here; the file's start time is the earliest input start.
    pub fn create_output(&mut self, path: impl AsRef<Path>) -> Result<Box<dyn LogOutput>> {
        let path = path.as_ref();
        let output: Box<dyn LogOutput> = match self.config.output {
            OutputKind::Text => Box::new(TextOutput::create(path, &self.config)?),
            OutputKind::Binary => {
                self.lines.normalize();
                let start = self.earliest_start.unwrap_or_default();
                let session = *self.lines.session();
                Box::new(BinaryOutput::create(path, start, session, &self.config)?)
            }
        };
        Ok(output)
    }

    /// Writes the block describing the merged inputs.
    pub fn write_metadata(&self, out: &mut dyn LogOutput) -> Result<()> {
        out.write_text("BEGIN METADATA")?;
        out.write_text("")?;
        out.write_text("FILES USED")?;
        for file in &self.files {
            match file.serial_number {
                Some(serial) => out.write_text(&format!("{} (serial number {})", file.name, serial))?,
                None => out.write_text(&file.name)?,
            }
        }

        out.write_text("")?;
        out.write_text("VERSIONS INVOLVED")?;
        for version in &self.versions {
            out.write_text(version)?;
        }

        out.write_text("")?;
        out.write_text("START DATE (MM/dd/yy)")?;
        if let Some(start) = self.earliest_start {
            let date = if self.config.use_utc {
                start.format("%A, %m/%d/%y").to_string()
            } else {
                start.with_timezone(&Local).format("%A, %m/%d/%y").to_string()
            };
            out.write_text(&date)?;
        }

        out.write_text("")?;
        out.write_text("END METADATA")?;
        out.write_text("")
    }

    /// Writes the metadata block and then every record in time order.
    /// Returns the number of records written.
    pub fn write_to(&mut self, out: &mut dyn LogOutput) -> Result<usize> {
        self.write_metadata(out)?;
        let mut written = 0;
        for line in self.lines.iter() {
            out.write_line(line)?;
            written += 1;
        }
        out.flush()?;
        Ok(written)
    }

    /// Creates `path` and writes the whole merge to it.
    pub fn merge_into(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut output = self.create_output(path)?;
        let written = self.write_to(output.as_mut())?;
        info!(path = %path.display(), records = written, files = self.files.len(), "wrote merged log");
        Ok(written)
    }

    fn absorb(&mut self, ingested: Option<Ingested>) -> bool {
        let Some(ingested) = ingested else {
            return false;
        };

        if let Some(version) = ingested.version {
            if !self.versions.contains(&version) {
                self.versions.push(version);
            }
        }
        if let Some(first) = ingested.first_time {
            if self.earliest_start.map_or(true, |earliest| first < earliest) {
                self.earliest_start = Some(first);
            }
        }
        self.lines.extend(ingested.lines);
        self.files.push(ingested.summary);
        true
    }
}

/// Reads a whole file. `Ok(None)` when it is not a log or its name does not
/// say what level and start time a text log has.
fn ingest(path: &Path, config: &MergeConfig) -> Result<Option<Ingested>> {
    let source = match LogSource::open(path, config) {
        Ok(Some(source)) => source,
        Ok(None) => {
            warn!(path = %path.display(), "skipping non-log file");
            return Ok(None);
        }
        Err(LogError::UnrecognizedFileName(path)) => {
            warn!(path = %path.display(), "skipping text log with an unrecognized name");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    debug!(file = %name, kind = ?source.kind(), "reading log");

    let mut ingested = Ingested {
        summary: SourceSummary {
            name,
            serial_number: None,
            records: 0,
        },
        version: None,
        first_time: None,
        lines: Vec::new(),
    };

    for (index, line) in source.enumerate() {
        let line = line?;
        if index == 0 {
            ingested.first_time = Some(line.time());
            if !line.message().contains(SERIAL_MARKER) {
                // Version banner; reported in the metadata, not merged
                ingested.version = Some(line.message().to_string());
                continue;
            }
            ingested.summary.serial_number = serial_number(line.message());
        }
        ingested.lines.push(line);
    }

    ingested.summary.records = ingested.lines.len();
    Ok(Some(ingested))
}

/// Digits following `serialNo=`.
fn serial_number(message: &str) -> Option<u64> {
    let marker = format!("{}=", SERIAL_MARKER);
    let start = message.find(&marker)? + marker.len();
    let digits: String = message[start..].chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
