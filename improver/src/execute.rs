//! Running the target program and turning what happened into evidence text.
//!
//! Nothing here fails on ordinary program failure: nonzero exits, crashes and
//! launch errors all become [`ExecutionOutcome`] text for the evaluator.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::types::{ExecutionOutcome, ProgramType};
use crate::io::config::RunConfig;
use crate::io::process::{StartupOutcome, run_command, watch_startup};

/// Fixed ceiling on a health-check run.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Abstraction over how the target program is run each iteration.
pub trait ProgramRunner {
    fn run(&self) -> ExecutionOutcome;
}

/// Result of the optional health-check command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Passed,
    Failed,
    TimedOut,
    Error(String),
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Passed => f.write_str("passed"),
            HealthStatus::Failed => f.write_str("failed"),
            HealthStatus::TimedOut => f.write_str("timed out"),
            HealthStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Split a command line on whitespace. Quoting is not supported.
pub fn tokenize(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

/// Sentence reported when a long-running program survives its startup window.
pub fn survived_sentence(startup_timeout: Duration) -> String {
    format!(
        "Program started successfully and remained running for {} seconds.",
        startup_timeout.as_secs()
    )
}

/// Runs the configured execution command in script or long-running mode.
#[derive(Debug, Clone)]
pub struct ExecutionRunner {
    command: Vec<String>,
    program_type: ProgramType,
    startup_timeout: Duration,
    health_check: Option<Vec<String>>,
    health_check_timeout: Duration,
    output_limit_bytes: usize,
    workdir: PathBuf,
}

impl ExecutionRunner {
    pub fn from_config(cfg: &RunConfig, workdir: &Path) -> Self {
        Self {
            command: tokenize(&cfg.execution_command),
            program_type: cfg.program_type,
            startup_timeout: cfg.startup_timeout(),
            health_check: cfg.health_check_command.as_deref().map(tokenize),
            health_check_timeout: HEALTH_CHECK_TIMEOUT,
            output_limit_bytes: cfg.output_limit_bytes,
            workdir: workdir.to_path_buf(),
        }
    }

    /// Override the health-check ceiling.
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = timeout;
        self
    }

    fn command(&self, tokens: &[String]) -> Result<Command> {
        let (program, args) = tokens
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        Ok(cmd)
    }

    fn run_script(&self) -> Result<String> {
        let output = run_command(self.command(&self.command)?, None, self.output_limit_bytes)?;
        info!(exit_code = ?output.status.code(), "script finished");
        Ok(output.combined_text())
    }

    fn check_startup(&self) -> Result<String> {
        let outcome = watch_startup(
            self.command(&self.command)?,
            self.startup_timeout,
            self.output_limit_bytes,
        )?;
        match outcome {
            StartupOutcome::Exited(output) => {
                warn!(exit_code = ?output.status.code(), "program exited during startup window");
                Ok(output.combined_text())
            }
            StartupOutcome::SurvivedWindow => {
                info!(secs = self.startup_timeout.as_secs(), "program survived startup window");
                Ok(survived_sentence(self.startup_timeout))
            }
        }
    }

    /// Run the health-check command. Classified by exit code only.
    pub fn health_check(&self, tokens: &[String]) -> HealthStatus {
        let cmd = match self.command(tokens) {
            Ok(cmd) => cmd,
            Err(err) => return HealthStatus::Error(format!("{err:#}")),
        };
        match run_command(cmd, Some(self.health_check_timeout), self.output_limit_bytes) {
            Ok(output) if output.timed_out => HealthStatus::TimedOut,
            Ok(output) if output.status.success() => HealthStatus::Passed,
            Ok(_) => HealthStatus::Failed,
            Err(err) => HealthStatus::Error(format!("{err:#}")),
        }
    }
}

impl ProgramRunner for ExecutionRunner {
    #[instrument(skip_all, fields(program_type = ?self.program_type))]
    fn run(&self) -> ExecutionOutcome {
        let evidence = match self.program_type {
            ProgramType::Script => self.run_script(),
            ProgramType::LongRunning => self.check_startup(),
        };
        let mut text = evidence.unwrap_or_else(|err| {
            warn!(err = %format!("{err:#}"), "execution failed");
            format!("Error executing program: {err:#}")
        });

        if let (ProgramType::LongRunning, Some(tokens)) = (self.program_type, &self.health_check) {
            let status = self.health_check(tokens);
            info!(health = %status, "health check finished");
            text.push_str(&format!("\nHealth Check: {status}"));
        }
        ExecutionOutcome::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorkspace;
    use std::time::Instant;

    fn runner(command: &str, program_type: ProgramType) -> ExecutionRunner {
        ExecutionRunner {
            command: tokenize(command),
            program_type,
            startup_timeout: Duration::from_secs(1),
            health_check: None,
            health_check_timeout: Duration::from_secs(5),
            output_limit_bytes: 100_000,
            workdir: std::env::temp_dir(),
        }
    }

    fn with_health(mut runner: ExecutionRunner, command: &str) -> ExecutionRunner {
        runner.health_check = Some(tokenize(command));
        runner
    }

    #[test]
    fn tokenize_splits_on_any_whitespace() {
        assert_eq!(tokenize("  python\tmain.py  --flag "), vec!["python", "main.py", "--flag"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn script_outcome_is_stdout_then_stderr_regardless_of_exit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("prog.sh");
        std::fs::write(&script, "printf 'hello\\n'\nprintf 'oops\\n' >&2\nexit \"$1\"\n")
            .expect("write");

        for code in ["0", "4"] {
            let outcome = runner(
                &format!("sh {} {code}", script.display()),
                ProgramType::Script,
            )
            .run();
            assert_eq!(outcome.text, "hello\noops\n");
        }
    }

    #[test]
    fn launch_error_becomes_outcome_text() {
        let outcome = runner("definitely-not-a-real-binary-xyz --x", ProgramType::Script).run();
        assert!(outcome.text.starts_with("Error executing program: "), "{}", outcome.text);
    }

    #[test]
    fn long_running_survivor_reports_success_sentence() {
        let start = Instant::now();
        let outcome = runner("sleep 30", ProgramType::LongRunning).run();
        assert_eq!(
            outcome.text,
            "Program started successfully and remained running for 1 seconds."
        );
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn long_running_early_exit_reports_captured_output() {
        let outcome = runner("sh -c exit", ProgramType::LongRunning).run();
        assert_eq!(outcome.text, "");

        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("crash.sh");
        std::fs::write(&script, "echo starting\necho 'Traceback: boom' >&2\nexit 1\n")
            .expect("write");
        let outcome = runner(&format!("sh {}", script.display()), ProgramType::LongRunning).run();
        assert_eq!(outcome.text, "starting\nTraceback: boom\n");
        assert!(!outcome.text.contains("remained running"));
    }

    #[test]
    fn health_check_result_is_appended() {
        let passed = with_health(runner("sleep 30", ProgramType::LongRunning), "true").run();
        assert!(passed.text.ends_with("\nHealth Check: passed"), "{}", passed.text);
        assert!(passed.text.contains("remained running"));

        let failed = with_health(runner("sleep 30", ProgramType::LongRunning), "false").run();
        assert!(failed.text.ends_with("\nHealth Check: failed"), "{}", failed.text);
        assert!(failed.text.contains("remained running"));
    }

    #[test]
    fn health_check_times_out() {
        let runner = with_health(runner("sleep 30", ProgramType::LongRunning), "sleep 30")
            .with_health_check_timeout(Duration::from_millis(300));
        let outcome = runner.run();
        assert!(outcome.text.ends_with("\nHealth Check: timed out"), "{}", outcome.text);
    }

    #[test]
    fn launcher_that_leaves_a_daemon_behind_stays_within_the_startup_window() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("launch.sh");
        std::fs::write(&script, "sleep 20 &\necho launcher done\n").expect("write");

        let start = Instant::now();
        let outcome = runner(&format!("sh {}", script.display()), ProgramType::LongRunning).run();
        assert!(start.elapsed() < Duration::from_secs(5), "{:?}", start.elapsed());
        assert_eq!(outcome.text, "launcher done\n");
    }

    #[test]
    fn health_check_with_a_background_holder_respects_its_ceiling() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("check.sh");
        std::fs::write(&script, "sleep 20 &\nexec sleep 20\n").expect("write");

        let runner = with_health(
            runner("sleep 30", ProgramType::LongRunning),
            &format!("sh {}", script.display()),
        )
        .with_health_check_timeout(Duration::from_millis(500));
        let start = Instant::now();
        let outcome = runner.run();
        assert!(start.elapsed() < Duration::from_secs(5), "{:?}", start.elapsed());
        assert_eq!(
            outcome.text,
            "Program started successfully and remained running for 1 seconds.\nHealth Check: timed out"
        );
    }

    #[test]
    fn health_check_launch_error_is_reported() {
        let outcome = with_health(
            runner("sleep 30", ProgramType::LongRunning),
            "definitely-not-a-real-binary-xyz",
        )
        .run();
        assert!(outcome.text.contains("\nHealth Check: error: "), "{}", outcome.text);
    }

    #[test]
    fn script_mode_ignores_health_check() {
        let outcome = with_health(runner("echo hi", ProgramType::Script), "false").run();
        assert_eq!(outcome.text, "hi\n");
    }

    #[test]
    fn from_config_tokenizes_commands() {
        let ws = TestWorkspace::new().expect("workspace");
        let mut cfg = ws.config(1);
        cfg.program_type = ProgramType::LongRunning;
        cfg.startup_timeout = 8;
        cfg.health_check_command = Some("curl -f  http://localhost:5001/".to_string());

        let runner = ExecutionRunner::from_config(&cfg, ws.path());
        assert_eq!(runner.command, vec!["python", "main.py"]);
        assert_eq!(
            runner.health_check,
            Some(vec![
                "curl".to_string(),
                "-f".to_string(),
                "http://localhost:5001/".to_string()
            ])
        );
        assert_eq!(runner.startup_timeout, Duration::from_secs(8));
        assert_eq!(runner.health_check_timeout, HEALTH_CHECK_TIMEOUT);
        assert_eq!(runner.workdir, ws.path());
    }
}
