//! Resource wrapper
//!
//! Runs one resource script (`/opt/resource/in` or `/opt/resource/out`) as
//! a step of a stage pod. The wrapper:
//! 1. waits until its semaphore file is gone (polled, no timeout)
//! 2. layers the env file over its environment and turns the variables
//!    under its prefix into the input document
//! 3. pipes the document into the script while streaming and capturing its output
//! 4. on failure, writes a reproduction script and optionally stays alive
//!    for a grace period so the container can be inspected
//!
//! The sequence is a small state machine driven by [`ResourceWrapper::step`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::debug_dump;
use crate::env_doc::{EnvDocError, env_to_json};
use crate::env_file;
use crate::markers::MarkerStore;

/// How often the semaphore is checked
pub const SEMAPHORE_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long a failed container stays alive with `--wait-on-fail`
pub const FAIL_GRACE_PERIOD: Duration = Duration::from_secs(5 * 60);
/// Exit code of a failed resource run
pub const FAILURE_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum WrapperError {
    #[error("cannot read env file {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    EnvDoc(#[from] EnvDocError),

    #[error("no resource script given")]
    NoScript,

    #[error("cannot open capture file {}: {source}", path.display())]
    CaptureFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Settings of one wrapper run
#[derive(Debug, Clone)]
pub struct WrapperConfig {
    /// Only variables under `<prefix>.` make up the document
    pub env_prefix: String,
    /// Start once this file does not exist
    pub semaphore_file: PathBuf,
    /// Extra variables, read once the semaphore is gone
    pub env_file: Option<PathBuf>,
    pub ignore_missing_env_file: bool,
    pub delete_env_file_after_read: bool,
    /// Copy of the script's stdout
    pub stdout_file: Option<PathBuf>,
    /// Copy of the script's stderr
    pub stderr_file: Option<PathBuf>,
    /// Reproduction script written on failure
    pub debug_out: Option<PathBuf>,
    pub wait_on_fail: bool,
    /// Print the document instead of running the script
    pub just_print_json: bool,
    /// Script and its arguments
    pub script: Vec<String>,
    /// Path of the wrapper binary, for the reproduction script
    pub bin: String,
    pub poll_interval: Duration,
    pub fail_grace: Duration,
}

impl WrapperConfig {
    pub fn new(env_prefix: impl Into<String>, semaphore_file: impl Into<PathBuf>, script: Vec<String>) -> Self {
        Self {
            env_prefix: env_prefix.into(),
            semaphore_file: semaphore_file.into(),
            env_file: None,
            ignore_missing_env_file: false,
            delete_env_file_after_read: false,
            stdout_file: None,
            stderr_file: None,
            debug_out: None,
            wait_on_fail: false,
            just_print_json: false,
            script,
            bin: "ferry-resource".to_string(),
            poll_interval: SEMAPHORE_POLL_INTERVAL,
            fail_grace: FAIL_GRACE_PERIOD,
        }
    }
}

/// Progress of a wrapper run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingOnSemaphore,
    Executing,
    Done,
    Failed(i32),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Phase::Done => Some(0),
            Phase::Failed(code) => Some(*code),
            _ => None,
        }
    }
}

pub struct ResourceWrapper<M: MarkerStore> {
    config: WrapperConfig,
    env: BTreeMap<String, String>,
    markers: M,
    phase: Phase,
}

impl<M: MarkerStore> ResourceWrapper<M> {
    /// # Arguments
    /// * `config` - Settings of the run
    /// * `env` - Environment of the script; the env file is layered over it
    /// * `markers` - Where the semaphore is looked up
    pub fn new(config: WrapperConfig, env: BTreeMap<String, String>, markers: M) -> Self {
        Self {
            config,
            env,
            markers,
            phase: Phase::WaitingOnSemaphore,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Advance the state machine by one transition
    ///
    /// While waiting, each call checks the semaphore once and sleeps one
    /// poll interval if it is still present. Terminal phases are returned
    /// unchanged.
    pub async fn step(&mut self) -> Result<Phase, WrapperError> {
        self.phase = match self.phase {
            Phase::WaitingOnSemaphore => self.check_semaphore().await,
            Phase::Executing => self.execute().await?,
            terminal => terminal,
        };
        Ok(self.phase)
    }

    /// Step until a terminal phase and return the exit code
    pub async fn run(mut self) -> Result<i32, WrapperError> {
        info!(
            semaphore = %self.config.semaphore_file.display(),
            prefix = %self.config.env_prefix,
            "Waiting for semaphore to go away"
        );

        loop {
            let phase = self.step().await?;
            if let Some(code) = phase.exit_code() {
                return Ok(code);
            }
        }
    }

    async fn check_semaphore(&self) -> Phase {
        match self.markers.exists(&self.config.semaphore_file).await {
            Ok(false) => {
                info!(semaphore = %self.config.semaphore_file.display(), "Semaphore gone");
                return Phase::Executing;
            }
            Ok(true) => {
                debug!(semaphore = %self.config.semaphore_file.display(), "Semaphore present");
            }
            Err(e) => {
                warn!(
                    semaphore = %self.config.semaphore_file.display(),
                    error = %e,
                    "Cannot check semaphore, continuing anyway"
                );
            }
        }

        tokio::time::sleep(self.config.poll_interval).await;
        Phase::WaitingOnSemaphore
    }

    async fn execute(&mut self) -> Result<Phase, WrapperError> {
        if let Some(path) = self.config.env_file.as_deref() {
            let overrides = env_file::load(
                path,
                self.config.ignore_missing_env_file,
                self.config.delete_env_file_after_read,
            )
            .await?;
            self.env = env_file::merge(std::mem::take(&mut self.env), overrides);
        }

        let document = env_to_json(&self.env, &self.config.env_prefix)?;

        if self.config.just_print_json {
            println!("{}", document);
            return Ok(Phase::Done);
        }

        let (program, args) = self.config.script.split_first().ok_or(WrapperError::NoScript)?;

        match self.run_script(program, args, &document).await {
            Ok(true) => {
                info!(script = %program, "Resource script succeeded");
                Ok(Phase::Done)
            }
            Ok(false) => Ok(self.fail(program, &document).await),
            Err(e) => {
                error!(script = %program, error = %e, "Cannot run resource script");
                Ok(self.fail(program, &document).await)
            }
        }
    }

    /// Run the script with the document on stdin; `Ok(false)` if it failed
    async fn run_script(&self, program: &str, args: &[String], document: &str) -> Result<bool, WrapperError> {
        let stdout_capture = open_capture(self.config.stdout_file.as_deref()).await?;
        let stderr_capture = open_capture(self.config.stderr_file.as_deref()).await?;

        let mut child = match Command::new(program)
            .args(args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!(script = %program, error = %e, "Failed to start resource script");
                return Ok(false);
            }
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(document.as_bytes()).await {
                    warn!(error = %e, "Failed to write document to resource script");
                }
            }
        };
        let out = async move {
            if let Some(stdout) = stdout {
                tee(stdout, tokio::io::stdout(), stdout_capture).await;
            }
        };
        let err = async move {
            if let Some(stderr) = stderr {
                tee(stderr, tokio::io::stderr(), stderr_capture).await;
            }
        };
        tokio::join!(feed, out, err);

        match child.wait().await {
            Ok(status) if status.success() => Ok(true),
            Ok(status) => {
                error!(script = %program, %status, "Resource script failed");
                Ok(false)
            }
            Err(e) => {
                error!(script = %program, error = %e, "Failed to wait for resource script");
                Ok(false)
            }
        }
    }

    async fn fail(&self, program: &str, document: &str) -> Phase {
        if let Some(path) = &self.config.debug_out {
            let script = debug_dump::render(
                &self.config.bin,
                &self.config.env_prefix,
                program,
                document,
                &self.env,
            );
            match debug_dump::write(path, &script).await {
                Ok(()) => info!(path = %path.display(), "Dumped debug information"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to dump debug information"),
            }
        }

        if self.config.wait_on_fail {
            info!(
                grace = ?self.config.fail_grace,
                "Keeping the container alive for debugging"
            );
            tokio::time::sleep(self.config.fail_grace).await;
        } else {
            info!("Run with --wait-on-fail to keep the container alive after a failure");
        }

        Phase::Failed(FAILURE_EXIT_CODE)
    }
}

async fn open_capture(path: Option<&Path>) -> Result<Option<File>, WrapperError> {
    match path {
        Some(path) => File::create(path)
            .await
            .map(Some)
            .map_err(|source| WrapperError::CaptureFile {
                path: path.to_path_buf(),
                source,
            }),
        None => Ok(None),
    }
}

/// Copy `reader` to `console` and, if given, to `capture` as data arrives
async fn tee<R, W>(mut reader: R, mut console: W, mut capture: Option<File>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to read resource output");
                break;
            }
        };

        if let Err(e) = console.write_all(&buf[..n]).await {
            warn!(error = %e, "Failed to forward resource output");
        }
        let captured = match capture.as_mut() {
            Some(file) => file.write_all(&buf[..n]).await,
            None => Ok(()),
        };
        if let Err(e) = captured {
            warn!(error = %e, "Failed to capture resource output");
            capture = None;
        }
    }

    if let Err(e) = console.flush().await {
        warn!(error = %e, "Failed to flush resource output");
    }
    if let Some(mut file) = capture {
        if let Err(e) = file.flush().await {
            warn!(error = %e, "Failed to flush captured resource output");
        }
    }
}
