//! Child-process runner with a deadline.

use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::GopError;
use crate::progress::Deadline;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of a finished tool invocation.
#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub(crate) status: ExitStatus,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: String,
}

impl ToolOutput {
    /// The tool's stderr, or a placeholder naming the exit status when the
    /// tool printed nothing.
    pub(crate) fn diagnostic(&self) -> String {
        let text = self.stderr.trim();
        if text.is_empty() {
            format!("exited with {}", self.status)
        } else {
            text.to_string()
        }
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buffer);
        }
        buffer
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `program` with `args`, capturing both output streams.
///
/// The child is killed as soon as `deadline` expires or is cancelled. A
/// non-zero exit is not an error here; callers decide how to report it.
pub(crate) fn run<I, S>(program: &str, args: I, deadline: &Deadline) -> Result<ToolOutput, GopError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| GopError::ToolUnavailable {
            program: program.to_string(),
            reason: error.to_string(),
        })?;

    // Both pipes are drained concurrently; a full stdout pipe would
    // otherwise stall the child forever.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if let Err(error) = deadline.check() {
            log::warn!("Stopping {program}: {error}");
            kill(&mut child);
            let _ = stdout.join();
            let _ = stderr.join();
            return Err(error);
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(error) => {
                kill(&mut child);
                return Err(GopError::IoError(error));
            }
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = String::from_utf8_lossy(&stderr.join().unwrap_or_default()).into_owned();

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}
