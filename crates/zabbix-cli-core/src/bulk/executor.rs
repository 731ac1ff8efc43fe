use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::line::CommandLine;
use super::{BulkError, BulkMode, CommandDispatcher, CommandError};

/// Exit code after an interrupted run, as a shell reports SIGINT.
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ParseError(String),
    ExecutionError(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::ParseError(reason) => write!(f, "parse error: {reason}"),
            Outcome::ExecutionError(detail) => f.write_str(detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    /// 1-based line number in the input.
    pub line_number: usize,
    /// The line as written, trimmed.
    pub command: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    /// Command lines reached, blank and comment lines excluded.
    pub total_lines: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Unparseable lines discarded in skip mode.
    pub skipped_parse: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResult {
    pub mode: BulkMode,
    pub records: Vec<LineRecord>,
    pub summary: BulkSummary,
    /// Strict mode stopped at a failure.
    pub aborted: bool,
    /// An interrupt stopped the run between lines.
    pub interrupted: bool,
}

impl BulkResult {
    fn new(mode: BulkMode) -> Self {
        Self {
            mode,
            records: Vec::new(),
            summary: BulkSummary::default(),
            aborted: false,
            interrupted: false,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &LineRecord> {
        self.records
            .iter()
            .filter(|r| !matches!(r.outcome, Outcome::Success))
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            return EXIT_INTERRUPTED;
        }
        match self.mode {
            BulkMode::Strict | BulkMode::Continue if self.summary.failed > 0 => 1,
            _ => 0,
        }
    }

    fn record(&mut self, line_number: usize, command: &str, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.summary.succeeded += 1,
            Outcome::ParseError(_) | Outcome::ExecutionError(_) => self.summary.failed += 1,
        }
        self.records.push(LineRecord {
            line_number,
            command: command.to_string(),
            outcome,
        });
    }
}

/// Drives bulk lines through a `CommandDispatcher` one at a time.
pub struct BulkExecutor<'a, D: CommandDispatcher + ?Sized> {
    dispatcher: &'a mut D,
    mode: BulkMode,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<'a, D: CommandDispatcher + ?Sized> BulkExecutor<'a, D> {
    pub fn new(dispatcher: &'a mut D, mode: BulkMode) -> Self {
        Self {
            dispatcher,
            mode,
            interrupt: None,
        }
    }

    /// Stop between lines once `flag` is set. The line in flight finishes.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Read `path` and run every line in it.
    pub async fn run_file(&mut self, path: &Path) -> Result<BulkResult, BulkError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| BulkError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), mode = %self.mode, "Running bulk file");
        Ok(self.run_lines(contents.lines()).await)
    }

    /// Run `lines` in order.
    pub async fn run_lines<I, S>(&mut self, lines: I) -> BulkResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result = BulkResult::new(self.mode);

        for (index, raw) in lines.into_iter().enumerate() {
            let line_number = index + 1;
            let text = raw.as_ref().trim();

            if self.interrupted() {
                warn!(line = line_number, "Bulk run interrupted");
                result.interrupted = true;
                break;
            }

            let (name, args) = match CommandLine::parse(text) {
                Ok(CommandLine::Blank) | Ok(CommandLine::Comment) => {
                    debug!(line = line_number, "Skipping line");
                    continue;
                }
                Ok(CommandLine::Command { name, args }) => (name, args),
                Err(reason) => {
                    result.summary.total_lines += 1;
                    if self.handle_parse_error(&mut result, line_number, text, reason) {
                        break;
                    }
                    continue;
                }
            };
            result.summary.total_lines += 1;

            match self.dispatcher.execute(&name, &args).await {
                Ok(()) => {
                    info!(line = line_number, command = %text, "Command succeeded");
                    result.record(line_number, text, Outcome::Success);
                }
                Err(CommandError::Parse(reason)) => {
                    if self.handle_parse_error(&mut result, line_number, text, reason) {
                        break;
                    }
                }
                Err(CommandError::Execution(err)) => {
                    let detail = format!("{err:#}");
                    match self.mode {
                        BulkMode::Skip => {
                            warn!(line = line_number, command = %text, error = %detail, "Command failed, ignoring");
                        }
                        BulkMode::Continue => {
                            error!(line = line_number, command = %text, error = %detail, "Command failed");
                            result.record(line_number, text, Outcome::ExecutionError(detail));
                        }
                        BulkMode::Strict => {
                            error!(line = line_number, command = %text, error = %detail, "Command failed, aborting");
                            result.record(line_number, text, Outcome::ExecutionError(detail));
                            result.aborted = true;
                            break;
                        }
                    }
                }
            }
        }

        let summary = &result.summary;
        info!(
            total = summary.total_lines,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped_parse,
            "Bulk execution complete"
        );
        result
    }

    /// Apply the mode to a line that could not be parsed. Returns whether
    /// the run must stop.
    fn handle_parse_error(&self, result: &mut BulkResult, line_number: usize, text: &str, reason: String) -> bool {
        match self.mode {
            BulkMode::Skip => {
                warn!(line = line_number, command = %text, error = %reason, "Ignoring invalid line");
                result.summary.skipped_parse += 1;
                false
            }
            BulkMode::Continue => {
                error!(line = line_number, command = %text, error = %reason, "Unable to parse line");
                result.record(line_number, text, Outcome::ParseError(reason));
                false
            }
            BulkMode::Strict => {
                error!(line = line_number, command = %text, error = %reason, "Unable to parse line, aborting");
                result.record(line_number, text, Outcome::ParseError(reason));
                result.aborted = true;
                true
            }
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    /// Dispatcher that fails any command named `bad` and records what it ran.
    #[derive(Default)]
    struct FakeDispatcher {
        executed: Vec<String>,
        interrupt_after: Option<(usize, Arc<AtomicBool>)>,
    }

    #[async_trait]
    impl CommandDispatcher for FakeDispatcher {
        async fn execute(&mut self, command: &str, args: &[String]) -> Result<(), CommandError> {
            self.executed.push(format!("{command} {}", args.join(" ")).trim().to_string());
            if let Some((after, flag)) = &self.interrupt_after {
                if self.executed.len() == *after {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            match command {
                "bad" => Err(anyhow::anyhow!("host not found").into()),
                "unknown" => Err(CommandError::Parse("unrecognized command 'unknown'".to_string())),
                _ => Ok(()),
            }
        }
    }

    const OK_BAD_OK: [&str; 3] = ["ok first", "bad", "ok second"];

    #[tokio::test]
    async fn test_strict_stops_at_first_failure() {
        let mut dispatcher = FakeDispatcher::default();
        let result = BulkExecutor::new(&mut dispatcher, BulkMode::Strict)
            .run_lines(OK_BAD_OK)
            .await;

        assert_eq!(result.summary.succeeded, 1);
        assert_eq!(result.summary.failed, 1);
        assert!(result.aborted);
        assert_ne!(result.exit_code(), 0);
        assert_eq!(dispatcher.executed, vec!["ok first", "bad"]);
    }

    #[tokio::test]
    async fn test_continue_runs_everything() {
        let mut dispatcher = FakeDispatcher::default();
        let result = BulkExecutor::new(&mut dispatcher, BulkMode::Continue)
            .run_lines(OK_BAD_OK)
            .await;

        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.summary.total_lines, 3);
        assert!(!result.aborted);
        assert_ne!(result.exit_code(), 0);
        assert_eq!(dispatcher.executed.len(), 3);

        let failure = result.failures().next().unwrap();
        assert_eq!(failure.line_number, 2);
        assert_eq!(failure.outcome, Outcome::ExecutionError("host not found".to_string()));
    }

    #[tokio::test]
    async fn test_skip_records_no_failure() {
        let mut dispatcher = FakeDispatcher::default();
        let result = BulkExecutor::new(&mut dispatcher, BulkMode::Skip)
            .run_lines(OK_BAD_OK)
            .await;

        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(result.summary.failed, 0);
        assert_eq!(result.failures().count(), 0);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(dispatcher.executed.len(), 3);
    }

    #[tokio::test]
    async fn test_blank_and_comment_lines_not_counted() {
        let lines = ["# setup", "", "ok one", "   ", "  # indented comment", "ok two"];
        let mut dispatcher = FakeDispatcher::default();
        let result = BulkExecutor::new(&mut dispatcher, BulkMode::Strict)
            .run_lines(lines)
            .await;

        assert_eq!(result.summary.total_lines, 2);
        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(result.records[0].line_number, 3);
        assert_eq!(result.records[1].line_number, 6);
        assert_eq!(result.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_parse_errors_per_mode() {
        let lines = ["ok one", "ok \"unterminated", "unknown", "ok two"];

        let mut dispatcher = FakeDispatcher::default();
        let strict = BulkExecutor::new(&mut dispatcher, BulkMode::Strict)
            .run_lines(lines)
            .await;
        assert!(strict.aborted);
        assert!(matches!(strict.records[1].outcome, Outcome::ParseError(_)));
        assert_eq!(dispatcher.executed, vec!["ok one"]);

        let mut dispatcher = FakeDispatcher::default();
        let cont = BulkExecutor::new(&mut dispatcher, BulkMode::Continue)
            .run_lines(lines)
            .await;
        assert_eq!(cont.summary.failed, 2);
        assert_eq!(cont.summary.succeeded, 2);

        let mut dispatcher = FakeDispatcher::default();
        let skip = BulkExecutor::new(&mut dispatcher, BulkMode::Skip)
            .run_lines(lines)
            .await;
        assert_eq!(skip.summary.failed, 0);
        assert_eq!(skip.summary.skipped_parse, 2);
        assert_eq!(skip.summary.succeeded, 2);
        assert!(skip.records.iter().all(|r| r.outcome == Outcome::Success));
    }

    #[tokio::test]
    async fn test_interrupt_between_lines() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut dispatcher = FakeDispatcher {
            interrupt_after: Some((1, flag.clone())),
            ..Default::default()
        };
        let result = BulkExecutor::new(&mut dispatcher, BulkMode::Continue)
            .with_interrupt(flag)
            .run_lines(["ok one", "ok two", "ok three"])
            .await;

        assert!(result.interrupted);
        assert_eq!(result.summary.succeeded, 1);
        assert_eq!(result.exit_code(), EXIT_INTERRUPTED);
        assert_eq!(dispatcher.executed, vec!["ok one"]);
    }

    #[tokio::test]
    async fn test_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.txt");
        std::fs::write(&path, "# hosts\nok 'web 01'\nbad\n").unwrap();

        let mut dispatcher = FakeDispatcher::default();
        let result = BulkExecutor::new(&mut dispatcher, BulkMode::Continue)
            .run_file(&path)
            .await
            .unwrap();
        assert_eq!(result.summary.total_lines, 2);
        assert_eq!(dispatcher.executed, vec!["ok web 01", "bad"]);

        let err = BulkExecutor::new(&mut dispatcher, BulkMode::Strict)
            .run_file(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::ReadFile { .. }));
    }
}
