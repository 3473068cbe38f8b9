//! Process-backed workers.
//!
//! [`ProcessWorker`] spawns its executable for every execution, writes the
//! combined inputs to stdin as a single JSON line, reads one JSON object line
//! back from stdout, and enforces a timeout on the child.

use crate::plugin::interface::{PluginError, PluginResult, WorkInputs, WorkOutput, Worker};
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Worker implemented by an external executable.
#[derive(Clone, Debug)]
pub struct ProcessWorker {
    /// Worker name, for diagnostics
    name: String,
    /// Absolute executable path
    command: PathBuf,
    /// Extra arguments
    args: Vec<String>,
    /// Execution timeout
    timeout: Duration,
}

impl ProcessWorker {
    /// Create a new process worker.
    pub fn new(name: &str, command: PathBuf, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            command,
            args,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn spawn(&self) -> PluginResult<Child> {
        debug!(
            worker = %self.name,
            command = %self.command.display(),
            "spawning worker process"
        );
        Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PluginError::new(&format!("failed to spawn: {}", e)))
    }

    /// Waits for the child to exit, killing it once the timeout elapses.
    fn wait_for_exit(&self, child: &mut Child, started: Instant) -> PluginResult<()> {
        let poll_interval = Duration::from_millis(20);
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(PluginError::new(&format!(
                        "process exited with status {}",
                        status.code().unwrap_or(-1)
                    )))
                }
                Ok(None) => {
                    if started.elapsed() > self.timeout {
                        warn!(worker = %self.name, "worker process timed out, killing it");
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(PluginError::new(&format!(
                            "timed out after {}s",
                            self.timeout.as_secs()
                        )));
                    }
                    std::thread::sleep(poll_interval);
                }
                Err(e) => return Err(PluginError::new(&e.to_string())),
            }
        }
    }
}

impl Worker for ProcessWorker {
    fn execute(&self, inputs: &WorkInputs) -> PluginResult<WorkOutput> {
        let started = Instant::now();
        let mut request = serde_json::to_vec(&inputs.to_json())
            .map_err(|e| PluginError::new(&e.to_string()))?;
        request.push(b'\n');

        let mut child = self.spawn()?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(mut stdin), Some(stdout), Some(mut stderr)) = (stdin, stdout, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PluginError::new("failed to capture worker stdio"));
        };

        // All pipe I/O runs off this thread so the deadline below covers it.
        let name = self.name.clone();
        std::thread::spawn(move || {
            let mut buffer = String::new();
            if stderr.read_to_string(&mut buffer).is_ok() && !buffer.trim().is_empty() {
                debug!(worker = %name, stderr = %buffer.trim(), "worker stderr output");
            }
        });

        let name = self.name.clone();
        std::thread::spawn(move || {
            if let Err(e) = stdin.write_all(&request).and_then(|_| stdin.flush()) {
                debug!(worker = %name, error = %e, "worker did not consume its input");
            }
        });

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let read = BufReader::new(stdout).read_line(&mut line).map(|_| line);
            let _ = tx.send(read);
        });

        let line = match rx.recv_timeout(self.timeout) {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PluginError::new(&format!("failed to read response: {}", e)));
            }
            Err(_) => {
                warn!(worker = %self.name, "worker process produced no response in time");
                let _ = child.kill();
                let _ = child.wait();
                return Err(PluginError::new(&format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        self.wait_for_exit(&mut child, started)?;

        if line.trim().is_empty() {
            return Err(PluginError::new("process produced no output"));
        }
        match serde_json::from_str::<Value>(line.trim()) {
            Ok(Value::Object(output)) => Ok(output),
            Ok(_) => Err(PluginError::new("process output must be a JSON object")),
            Err(e) => Err(PluginError::new(&format!("invalid JSON output: {}", e))),
        }
    }
}
