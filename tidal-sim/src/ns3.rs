//! Bridge to an external ns-3 packet-level run.
//!
//! The launcher script of an ns-3 checkout is invoked with a scratch program
//! and command-line flags describing a dumbbell. The program writes one CSV
//! trace per flow into the checkout, which is parsed into [`Snapshot`]s so the
//! results line up with the fluid model's traces.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use serde::Serialize;
use tidal_core::config::ExternalEngineConfig;
use tidal_core::{Algorithm, FlowId, LinkParams, Phase, TidalError, ensure_positive};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::single::SingleFlowParams;
use crate::trace::{Snapshot, Trace};

/// Columns every trace file must provide.
const REQUIRED_COLUMNS: [&str; 5] = [
    "time",
    "cwnd_pkts",
    "throughput_mbps",
    "buffer_pkts",
    "inflight_pkts",
];

/// Failures of an external engine run.
///
/// None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("ns-3 launcher not found at {path}")]
    ExecutableNotFound { path: PathBuf },

    #[error("Failed to start ns-3: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },

    #[error("ns-3 exited with {status}: {stderr}")]
    NonZeroExit {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },

    #[error("ns-3 did not finish within {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("ns-3 finished but did not write {path}")]
    OutputMissing {
        path: PathBuf,
        stdout: String,
        stderr: String,
    },

    #[error("Malformed trace {path} at line {line}: {reason}")]
    MalformedOutput {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    InvalidRequest(#[from] TidalError),
}

/// Dumbbell run handed to the scratch program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ns3Request {
    /// One algorithm per flow, in trace index order
    pub flows: Vec<Algorithm>,
    pub link: LinkParams,
    /// Simulated seconds, passed to ns-3 truncated to whole seconds
    pub duration: f64,
    /// Trace sampling interval in seconds, program default when absent
    pub sample_dt: Option<f64>,
    /// Queue discipline name, program default when absent
    pub qdisc: Option<String>,
}

impl Ns3Request {
    /// Request mirroring a single-flow fluid run.
    pub fn single(params: &SingleFlowParams) -> Self {
        Self {
            flows: vec![params.algorithm],
            link: params.link(),
            duration: params.duration,
            sample_dt: None,
            qdisc: None,
        }
    }

    /// Checks the request can be expressed on the program's command line.
    ///
    /// # Errors
    /// - `TidalError::InvalidParameter` - No flows, bad link, duration or
    ///   sampling interval, or a queue discipline name with unsupported characters
    pub fn validate(&self) -> tidal_core::Result<()> {
        if self.flows.is_empty() {
            return Err(TidalError::invalid("flows", "at least one flow is required"));
        }
        self.link.validate()?;
        ensure_positive("duration", self.duration)?;
        if self.duration < 1.0 {
            return Err(TidalError::invalid(
                "duration",
                "ns-3 runs in whole seconds, at least 1 is required",
            ));
        }
        if let Some(sample_dt) = self.sample_dt {
            ensure_positive("sample_dt", sample_dt)?;
        }
        if let Some(qdisc) = &self.qdisc {
            let valid = !qdisc.is_empty()
                && qdisc
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(TidalError::invalid(
                    "qdisc",
                    format!("unsupported queue discipline name '{qdisc}'"),
                ));
            }
        }
        Ok(())
    }

    /// Duration as the program's integer `--duration` option, fraction dropped.
    pub fn whole_seconds(&self) -> u64 {
        self.duration.trunc() as u64
    }

    /// Program invocation passed to `ns3 run` as one argument.
    pub fn run_string(&self, program: &str) -> String {
        let flows: Vec<&str> = self.flows.iter().map(|a| a.as_str()).collect();
        let mut run = format!(
            "{program} --flows={} --rate={}Mbps --delay={}ms --bufferPkts={} --duration={} --mss={}",
            flows.join(","),
            self.link.bandwidth,
            self.link.delay,
            self.link.buffer,
            self.whole_seconds(),
            self.link.mss
        );
        if let Some(sample_dt) = self.sample_dt {
            run.push_str(&format!(" --sampleDt={sample_dt}"));
        }
        if let Some(qdisc) = &self.qdisc {
            run.push_str(&format!(" --qdisc={qdisc}"));
        }
        run
    }
}

/// Per-flow traces produced by ns-3, keyed by flow index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ns3Report {
    pub traces: BTreeMap<FlowId, Trace>,
}

/// Runs the ns-3 scratch program of one checkout.
#[derive(Debug, Clone)]
pub struct Ns3Bridge {
    ns3_dir: PathBuf,
    program: String,
    timeout: Duration,
}

impl Ns3Bridge {
    /// Creates bridge from the external engine configuration.
    pub fn new(config: &ExternalEngineConfig) -> Self {
        Self {
            ns3_dir: config.ns3_dir.clone(),
            program: config.program.clone(),
            timeout: config.timeout,
        }
    }

    /// Path of the `ns3` launcher script.
    pub fn launcher(&self) -> PathBuf {
        self.ns3_dir.join("ns3")
    }

    /// Trace file written for flow `index`.
    pub fn trace_path(&self, index: usize) -> PathBuf {
        self.ns3_dir.join(format!("trace_flow{index}.csv"))
    }

    /// Runs `request` and parses one trace per flow.
    ///
    /// The child is killed if it outlives the configured timeout.
    ///
    /// # Errors
    /// - `EngineError::InvalidRequest` - Request failed validation
    /// - `EngineError::ExecutableNotFound` - No launcher in the checkout
    /// - `EngineError::Spawn` - Launcher could not be started
    /// - `EngineError::TimedOut` - Run exceeded the timeout
    /// - `EngineError::NonZeroExit` - Launcher reported failure
    /// - `EngineError::OutputMissing` - A trace file was not written
    /// - `EngineError::MalformedOutput` - A trace file could not be parsed
    /// - `EngineError::Io` - Trace files could not be removed or read
    pub async fn run(&self, request: &Ns3Request) -> Result<Ns3Report, EngineError> {
        request.validate()?;

        let launcher = self.launcher();
        let exists = tokio::fs::try_exists(&launcher)
            .await
            .map_err(|source| EngineError::Io {
                path: launcher.clone(),
                source,
            })?;
        if !exists {
            return Err(EngineError::ExecutableNotFound { path: launcher });
        }

        for index in 0..request.flows.len() {
            self.remove_stale(&self.trace_path(index)).await;
        }

        let run_string = request.run_string(&self.program);
        info!("Running ns-3: {} run \"{}\"", launcher.display(), run_string);

        let mut cmd = Command::new(&launcher);
        cmd.arg("run")
            .arg(&run_string)
            .current_dir(&self.ns3_dir)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| EngineError::Spawn { source })?,
            Err(_) => {
                warn!("ns-3 run exceeded {:?}, killed", self.timeout);
                return Err(EngineError::TimedOut {
                    timeout: self.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(EngineError::NonZeroExit {
                status: output.status,
                stdout,
                stderr,
            });
        }

        let mut report = Ns3Report::default();
        for index in 0..request.flows.len() {
            let path = self.trace_path(index);
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    return Err(EngineError::OutputMissing {
                        path,
                        stdout,
                        stderr,
                    });
                }
                Err(source) => return Err(EngineError::Io { path, source }),
            };
            let trace = parse_trace(&path, &contents)?;
            debug!(flow = index, samples = trace.len(), "Parsed ns-3 trace");
            report.traces.insert(FlowId::new(index.to_string()), trace);
        }

        Ok(report)
    }

    async fn remove_stale(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed stale trace {}", path.display()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!("Could not remove old trace {}: {}", path.display(), error),
        }
    }
}

/// Parses a trace CSV into snapshots.
///
/// Columns are located by header name, so extra columns are ignored. Blank
/// lines are skipped.
///
/// # Errors
/// - `EngineError::MalformedOutput` - Missing header or column, short row, or
///   a value that is not a number
pub fn parse_trace(path: &Path, contents: &str) -> Result<Trace, EngineError> {
    let malformed = |line: usize, reason: String| EngineError::MalformedOutput {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut lines = contents.lines().enumerate();
    let header = lines
        .next()
        .map(|(_, header)| header)
        .ok_or_else(|| malformed(1, "empty file".to_string()))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();

    let mut indices = [0usize; REQUIRED_COLUMNS.len()];
    for (slot, name) in indices.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = columns
            .iter()
            .position(|column| *column == name)
            .ok_or_else(|| malformed(1, format!("missing column '{name}'")))?;
    }

    let mut trace = Trace::new();
    for (index, line) in lines {
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();

        let mut values = [0.0f64; REQUIRED_COLUMNS.len()];
        for ((value, column), name) in values.iter_mut().zip(indices).zip(REQUIRED_COLUMNS) {
            let field = fields
                .get(column)
                .ok_or_else(|| malformed(line_number, format!("missing value for '{name}'")))?;
            *value = field.parse().map_err(|_| {
                malformed(line_number, format!("'{field}' is not a number for '{name}'"))
            })?;
        }

        let [time, cwnd, throughput, buffer, inflight] = values;
        trace.push(Snapshot {
            time,
            cwnd,
            throughput,
            buffer,
            inflight,
            phase: Phase::External,
            sent: 0.0,
            delivered: 0.0,
            dropped: 0.0,
        });
    }

    Ok(trace)
}
