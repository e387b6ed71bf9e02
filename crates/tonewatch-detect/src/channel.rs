//! External shell-execution boundary to the device under test.
//!
//! Failures surface as a non-empty `stderr` in the output, mirroring
//! the remote shell convention; `Err` is reserved for the channel
//! itself breaking (spawn failure, timeout).

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tonewatch_foundation::DetectError;

#[derive(Debug, Clone, Default)]
pub struct ChannelOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ChannelOutput {
    pub fn is_failure(&self) -> bool {
        !self.stderr.is_empty()
    }
}

pub trait DeviceChannel: Send + Sync {
    fn execute(
        &self,
        tokens: &[&str],
        device_id: &str,
        timeout: Duration,
    ) -> Result<ChannelOutput, DetectError>;
}

pub type SharedChannel = Arc<dyn DeviceChannel>;

/// `adb -s <device> shell <tokens…>` over a local adb binary.
pub struct AdbShellChannel {
    adb_path: String,
}

impl AdbShellChannel {
    pub fn new() -> Self {
        Self {
            adb_path: "adb".to_string(),
        }
    }

    pub fn with_path(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }
}

impl Default for AdbShellChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceChannel for AdbShellChannel {
    fn execute(
        &self,
        tokens: &[&str],
        device_id: &str,
        timeout: Duration,
    ) -> Result<ChannelOutput, DetectError> {
        let mut child = Command::new(&self.adb_path)
            .args(["-s", device_id, "shell"])
            .args(tokens)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Both pipes are drained while the child runs; output larger
        // than the OS pipe buffer must not block it before exit.
        let stdout_reader = spawn_pipe_reader(child.stdout.take());
        let stderr_reader = spawn_pipe_reader(child.stderr.take());

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait()? {
                Some(_) => break,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(DetectError::Channel {
                        stderr: format!("adb shell timed out after {:?}", timeout),
                    });
                }
                None => thread::sleep(Duration::from_millis(10)),
            }
        }

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        Ok(ChannelOutput { stdout, stderr })
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}
