//! Request/response plumbing for external worker processes.
//!
//! A worker is started with piped stdio, optionally fed one payload on stdin
//! (which is then closed), and awaited while stdout and stderr are drained.
//! All three pipes are serviced concurrently: a worker that interleaves
//! reading input with writing output must never stall on a full pipe buffer.

use crate::error::{AppError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, warn};

/// How to start a worker
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Everything a finished worker produced
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl WorkerOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// `python -u <script>`: unbuffered so progress lines arrive as they are printed
    pub fn python_script(python: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        let script: PathBuf = script.into();
        Self::new(python).args(["-u".to_string(), script.display().to_string()])
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn display_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Run the worker to completion, or kill it once `limit` elapses.
    ///
    /// The exit code is reported, not judged: deciding what counts as success
    /// is up to the caller.
    pub async fn run(&self, input: Option<Vec<u8>>, limit: Duration) -> Result<WorkerOutput> {
        let program = self.display_name();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| AppError::ProcessSpawn {
            program: program.clone(),
            source,
        })?;

        debug!("Started worker {} (pid {:?})", program, child.id());

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let exchange = async {
            let (written, out, err) = tokio::join!(
                write_input(stdin, input),
                drain(stdout),
                drain(stderr)
            );

            if let Err(e) = written {
                // The worker stopped reading; its output and exit code tell the real story
                warn!("Could not deliver full input to worker {}: {}", program, e);
            }

            let stdout = out?;
            let stderr = err?;
            let status = child.wait().await?;

            Ok::<_, AppError>(WorkerOutput {
                exit_code: status.code(),
                stdout,
                stderr,
            })
        };

        let outcome = tokio::time::timeout(limit, exchange).await;

        match outcome {
            Ok(result) => {
                let output = result?;
                debug!(
                    "Worker {} exited with {:?} ({} bytes stdout, {} bytes stderr)",
                    program,
                    output.exit_code,
                    output.stdout.len(),
                    output.stderr.len()
                );
                Ok(output)
            }
            Err(_) => {
                warn!("Worker {} exceeded {:?}, killing it", program, limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill worker {}: {}", program, e);
                }
                Err(AppError::Timeout { program, limit })
            }
        }
    }
}

async fn write_input(stdin: Option<ChildStdin>, input: Option<Vec<u8>>) -> std::io::Result<()> {
    if let (Some(mut pipe), Some(bytes)) = (stdin, input) {
        pipe.write_all(&bytes).await?;
        pipe.shutdown().await?;
        // Dropping the handle closes the pipe and signals end of input
    }
    Ok(())
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> WorkerCommand {
        WorkerCommand::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_echoes_stdin_and_captures_stderr() {
        let output = shell("cat; echo oops >&2")
            .run(Some(b"[1,2,3]".to_vec()), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "[1,2,3]");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_reports_nonzero_exit() {
        let output = shell("exit 3").run(None, Duration::from_secs(10)).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        // Produce far more than a pipe buffer while the input is still being written
        let input = vec![b'x'; 512 * 1024];
        let output = shell("head -c 1048576 /dev/zero | tr '\\0' 'y'; cat > /dev/null")
            .run(Some(input), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(output.stdout.len(), 1024 * 1024);
    }

    #[tokio::test]
    async fn test_timeout_kills_worker() {
        let result = shell("sleep 5").run(None, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(AppError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let result = WorkerCommand::new("/nonexistent/wqi-worker")
            .run(None, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(AppError::ProcessSpawn { .. })));
    }

    #[test]
    fn test_python_script_arguments() {
        let command = WorkerCommand::python_script("python3", "tft/inference.py");
        assert_eq!(command.args, vec!["-u", "tft/inference.py"]);
    }
}
