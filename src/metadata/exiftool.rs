//! Long-lived ExifTool process speaking the `-stay_open` argument protocol.
//!
//! One process serves the whole run. Each request is written to its stdin as
//! one argument per line, terminated by `-execute<N>`; ExifTool answers on
//! stdout followed by a `{ready<N>}` line. An `-echo4` marker with the same
//! text is appended so stderr can be delimited the same way.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::fields::{RawFieldMap, all_read_fields};
use super::gateway::{MetadataError, MetadataGateway, WriteOptions};
use crate::models::CanonicalRecord;

/// Environment variable naming the ExifTool executable.
pub const EXIFTOOL_ENV: &str = "PHOTOTAG_EXIFTOOL";

const DEFAULT_EXECUTABLE: &str = "exiftool";
const STDERR_TIMEOUT: Duration = Duration::from_secs(5);

pub const WRITE_IDENTIFIER_TAG: &str = "XMP:Identifier";
pub const WRITE_STATUS_TAG: &str = "XMP:Status";
pub const WRITE_DESCRIPTION_TAG: &str = "MWG:Description";
pub const WRITE_KEYWORDS_TAG: &str = "MWG:Keywords";

/// Builder for [`ExifTool`].
///
/// # Examples
///
/// ```no_run
/// use phototag::metadata::ExifToolBuilder;
///
/// let exiftool = ExifToolBuilder::new()
///     .executable("/usr/local/bin/exiftool")
///     .build()
///     .expect("failed to start exiftool");
/// ```
#[derive(Debug, Default)]
pub struct ExifToolBuilder {
    executable: Option<PathBuf>,
}

impl ExifToolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path to the ExifTool executable.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Starts the ExifTool process.
    ///
    /// If `executable()` was not called, `PHOTOTAG_EXIFTOOL` is consulted,
    /// then `exiftool` on the `PATH`.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::Spawn` if the process cannot be started.
    pub fn build(self) -> Result<ExifTool, MetadataError> {
        let executable = match self.executable {
            Some(path) => path,
            None => std::env::var(EXIFTOOL_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_EXECUTABLE)),
        };
        ExifTool::spawn(executable)
    }
}

struct Process {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: Receiver<String>,
    stderr_reader: Option<JoinHandle<()>>,
}

struct Response {
    stdout: String,
    stderr: Vec<String>,
}

impl Response {
    fn errors(&self) -> Vec<&str> {
        self.stderr
            .iter()
            .map(|line| line.trim())
            .filter(|line| line.starts_with("Error"))
            .collect()
    }
}

/// [`MetadataGateway`] backed by a persistent ExifTool process.
pub struct ExifTool {
    executable: PathBuf,
    process: Option<Process>,
    sequence: u64,
}

impl ExifTool {
    fn spawn(executable: PathBuf) -> Result<Self, MetadataError> {
        let mut child = Command::new(&executable)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MetadataError::Spawn {
                executable: executable.display().to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MetadataError::Protocol("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MetadataError::Protocol("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MetadataError::Protocol("failed to capture stderr".to_string()))?;

        let (tx, rx) = mpsc::channel();
        let stderr_reader = thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        debug!(executable = %executable.display(), "started metadata tool");

        Ok(Self {
            executable,
            process: Some(Process {
                child,
                stdin,
                stdout: BufReader::new(stdout),
                stderr: rx,
                stderr_reader: Some(stderr_reader),
            }),
            sequence: 0,
        })
    }

    /// Returns the executable this process was started from.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn execute(&mut self, args: &[String]) -> Result<Response, MetadataError> {
        let process = self.process.as_mut().ok_or(MetadataError::Closed)?;
        self.sequence += 1;
        let marker = format!("{{ready{}}}", self.sequence);

        for arg in args {
            writeln!(process.stdin, "{arg}")?;
        }
        writeln!(process.stdin, "-echo4")?;
        writeln!(process.stdin, "{marker}")?;
        writeln!(process.stdin, "-execute{}", self.sequence)?;
        process.stdin.flush()?;

        let mut stdout = String::new();
        loop {
            let mut line = String::new();
            if process.stdout.read_line(&mut line)? == 0 {
                return Err(MetadataError::Protocol(
                    "metadata tool closed its output".to_string(),
                ));
            }
            if line.trim_end() == marker {
                break;
            }
            stdout.push_str(&line);
        }

        let mut stderr = Vec::new();
        loop {
            match process.stderr.recv_timeout(STDERR_TIMEOUT) {
                Ok(line) if line.trim_end() == marker => break,
                Ok(line) => stderr.push(line),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(marker = %marker, "timed out waiting for metadata tool stderr marker");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(Response { stdout, stderr })
    }
}

impl MetadataGateway for ExifTool {
    fn read_batch(
        &mut self,
        files: &[PathBuf],
        validate: bool,
    ) -> Result<Vec<RawFieldMap>, MetadataError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.execute(&read_args(files, validate))?;
        for line in &response.stderr {
            debug!(message = %line.trim(), "metadata tool read diagnostic");
        }

        parse_read_output(&response.stdout)
    }

    fn write(
        &mut self,
        record: &CanonicalRecord,
        options: WriteOptions,
    ) -> Result<(), MetadataError> {
        let args = write_args(record, options);

        if options.dry_run {
            if !record.source_file.exists() {
                return Err(MetadataError::Tool {
                    path: record.source_file.clone(),
                    message: "file does not exist".to_string(),
                });
            }
            debug!(path = %record.source_file.display(), args = args.len(), "dry run, not writing");
            return Ok(());
        }

        let response = self.execute(&args)?;
        let errors = response.errors();
        if !errors.is_empty() {
            return Err(MetadataError::Tool {
                path: record.source_file.clone(),
                message: errors.join("; "),
            });
        }
        for line in &response.stderr {
            debug!(message = %line.trim(), "metadata tool write diagnostic");
        }
        debug!(path = %record.source_file.display(), output = %response.stdout.trim(), "metadata written");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), MetadataError> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        let stopped = writeln!(process.stdin, "-stay_open")
            .and_then(|()| writeln!(process.stdin, "False"))
            .and_then(|()| process.stdin.flush());
        if stopped.is_err() {
            let _ = process.child.kill();
        }
        drop(process.stdin);

        let status = process.child.wait()?;
        if let Some(reader) = process.stderr_reader.take() {
            let _ = reader.join();
        }
        debug!(%status, "metadata tool terminated");
        Ok(())
    }
}

impl Drop for ExifTool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "metadata tool did not shut down cleanly");
        }
    }
}

/// Arguments for a batch read.
pub fn read_args(files: &[PathBuf], validate: bool) -> Vec<String> {
    let mut args = vec!["-j".to_string(), "-G".to_string(), "-n".to_string()];
    if validate {
        args.push("-validate".to_string());
    }
    args.extend(all_read_fields().map(|field| format!("-{field}")));
    args.extend(files.iter().map(|f| f.to_string_lossy().into_owned()));
    args
}

/// Arguments for writing the canonical fields of `record`.
///
/// Unset fields are left out so they keep whatever the file already holds.
/// Keyword assignments in one command replace the whole list.
pub fn write_args(record: &CanonicalRecord, options: WriteOptions) -> Vec<String> {
    let mut args = vec!["-P".to_string()];
    if !options.backup {
        args.push("-overwrite_original".to_string());
    }
    if let Some(identifier) = &record.identifier {
        args.push(format!("-{WRITE_IDENTIFIER_TAG}={}", single_line(identifier.as_str())));
    }
    if let Some(status) = record.status {
        args.push(format!("-{WRITE_STATUS_TAG}={status}"));
    }
    if let Some(description) = &record.description {
        args.push(format!("-{WRITE_DESCRIPTION_TAG}={}", single_line(description)));
    }
    for keyword in &record.keywords {
        args.push(format!("-{WRITE_KEYWORDS_TAG}={}", single_line(keyword)));
    }
    args.push(record.source_file.to_string_lossy().into_owned());
    args
}

/// Parses `-j` output into one map per file.
fn parse_read_output(stdout: &str) -> Result<Vec<RawFieldMap>, MetadataError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let values: Vec<Value> = serde_json::from_str(trimmed).map_err(MetadataError::Parse)?;
    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(object) => RawFieldMap::from_json_object(object),
            _ => None,
        })
        .collect())
}

/// The argument file is line based, so embedded newlines would split a value.
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
