//! Metric collection over one remote session
//!
//! [`MetricCollector::collect`] runs [`CommandKind::METRICS_BATCH`] in order,
//! parses each output, and assembles a [`Sample`]. Commands that fail leave
//! their fields empty; a broken session aborts the whole batch.

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use super::command::CommandKind;
use super::metrics::Sample;
use super::parser::{CommandOutput, MetricsParser, MonitoringError};
use crate::error::SessionError;
use crate::session::{ExecError, RemoteSession};

/// Default timeout for a single remote command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from running and parsing remote commands
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectError {
    /// A command exceeded its timeout
    #[error("Command timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Output was not recognised
    #[error(transparent)]
    ParseError(#[from] MonitoringError),

    /// The session is unusable
    #[error("Session broken: {0}")]
    BrokenSession(String),

    /// The remote command exited non-zero
    #[error("Remote command failed: {0}")]
    CommandFailed(String),
}

impl CollectError {
    /// Returns true if the session must be torn down
    #[must_use]
    pub const fn is_broken_session(&self) -> bool {
        matches!(self, Self::BrokenSession(_))
    }
}

impl From<ExecError> for CollectError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Timeout(after) => Self::Timeout(after),
            ExecError::BrokenSession(reason) => Self::BrokenSession(reason),
            failed @ ExecError::CommandFailed { .. } => Self::CommandFailed(failed.to_string()),
        }
    }
}

impl From<CollectError> for SessionError {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::Timeout(after) => Self::Timeout(after),
            CollectError::ParseError(e) => Self::ParseError(e.to_string()),
            CollectError::BrokenSession(reason) => Self::BrokenSession(reason),
            CollectError::CommandFailed(reason) => Self::CommandFailed(reason),
        }
    }
}

/// Runs the metrics batch against a session
#[derive(Debug, Clone, Copy)]
pub struct MetricCollector {
    command_timeout: Duration,
    parser: MetricsParser,
}

impl Default for MetricCollector {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT, MetricsParser::default())
    }
}

impl MetricCollector {
    /// Creates a collector with a per-command timeout
    #[must_use]
    pub const fn new(command_timeout: Duration, parser: MetricsParser) -> Self {
        Self {
            command_timeout,
            parser,
        }
    }

    /// Runs one command and parses its output.
    ///
    /// # Errors
    ///
    /// Returns the execution error, or [`CollectError::ParseError`] if the
    /// output is not recognised.
    pub async fn execute(
        &self,
        session: &dyn RemoteSession,
        kind: CommandKind,
    ) -> Result<CommandOutput, CollectError> {
        let raw = session.exec(kind, self.command_timeout).await?;
        Ok(self.parser.parse(kind, &raw)?)
    }

    /// Collects one [`Sample`].
    ///
    /// # Errors
    ///
    /// - [`CollectError::BrokenSession`] as soon as any command reports it
    /// - the first error of the batch if every command failed
    pub async fn collect(&self, session: &dyn RemoteSession) -> Result<Sample, CollectError> {
        let mut sample = Sample::empty();
        let mut first_error = None;
        let mut succeeded = 0usize;

        for kind in CommandKind::METRICS_BATCH {
            match self.execute(session, kind).await {
                Ok(output) => {
                    succeeded += 1;
                    apply(&mut sample, output);
                }
                Err(e) if e.is_broken_session() => return Err(e),
                Err(e) => {
                    tracing::debug!(command = %kind, error = %e, "Metric command failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if succeeded == 0
            && let Some(err) = first_error
        {
            return Err(err);
        }

        sample.timestamp = Utc::now();
        Ok(sample)
    }
}

fn apply(sample: &mut Sample, output: CommandOutput) {
    match output {
        CommandOutput::Cpu(pct) => sample.cpu_percent = Some(pct),
        CommandOutput::Memory(mem) => sample.memory = Some(mem),
        CommandOutput::Disk(disk) => sample.disk = Some(disk),
        CommandOutput::Network(net) => sample.network = Some(net),
        CommandOutput::Load(load) => sample.load_average = Some(load),
        CommandOutput::Processes(list) => {
            sample.process_count = Some(list.count);
            sample.top_processes = Some(list.top);
        }
        CommandOutput::Alive | CommandOutput::SystemInfo(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSession, fixtures};

    #[tokio::test]
    async fn test_full_batch() {
        let session = MockSession::healthy();
        let sample = MetricCollector::default().collect(&session).await.unwrap();

        assert!(!sample.is_degraded());
        assert!(sample.cpu_percent.is_some());
        assert!(sample.memory_percent().is_some());
        assert_eq!(sample.process_count, Some(3));
        assert!(sample.top_processes.unwrap().len() <= 3);
    }

    #[tokio::test]
    async fn test_partial_failure_yields_degraded_sample() {
        let session = MockSession::healthy()
            .with_output(CommandKind::Disk, "garbage")
            .with_error(
                CommandKind::Network,
                ExecError::CommandFailed {
                    status: 1,
                    stderr: "tail: cannot open".into(),
                },
            );
        let sample = MetricCollector::default().collect(&session).await.unwrap();

        assert!(sample.disk.is_none());
        assert!(sample.network.is_none());
        assert!(sample.cpu_percent.is_some());
        assert_eq!(sample.missing_fields(), 2);
    }

    #[tokio::test]
    async fn test_broken_session_fails_whole_batch() {
        let session = MockSession::healthy().with_error(
            CommandKind::Load,
            ExecError::BrokenSession("connection reset".into()),
        );
        let err = MetricCollector::default().collect(&session).await.unwrap_err();
        assert!(err.is_broken_session());
    }

    #[tokio::test]
    async fn test_all_failed_returns_first_error() {
        let mut session = MockSession::new();
        for kind in CommandKind::METRICS_BATCH {
            session = session.with_output(kind, "???");
        }
        session = session.with_error(CommandKind::Cpu, ExecError::Timeout(Duration::from_secs(1)));

        let err = MetricCollector::default().collect(&session).await.unwrap_err();
        assert_eq!(err, CollectError::Timeout(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_execute_parses_typed_output() {
        let session = MockSession::healthy();
        let out = MetricCollector::default()
            .execute(&session, CommandKind::Load)
            .await
            .unwrap();
        assert!(matches!(out, CommandOutput::Load(_)));

        let session = MockSession::new().with_output(CommandKind::Echo, fixtures::LIVENESS);
        let out = MetricCollector::default()
            .execute(&session, CommandKind::Echo)
            .await
            .unwrap();
        assert_eq!(out, CommandOutput::Alive);
    }
}
