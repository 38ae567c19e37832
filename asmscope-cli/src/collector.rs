//! Output Collector
//!
//! Drains a child's stdout and stderr on dedicated reader threads while the
//! caller waits for the process to exit. Each reader owns its buffer and hands
//! it back through its join handle, so output is only treated as final once
//! the stream hit EOF *and* the process exited. Draining both pipes
//! concurrently keeps a chatty child from blocking on a full pipe.

use crate::shutdown::CancelToken;
use std::io::{self, Read};
use std::process::{Child, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Interval between exit and cancellation checks
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Time a child gets to exit after SIGTERM before it is killed
#[cfg(unix)]
const TERMINATE_GRACE: Duration = Duration::from_millis(50);
/// Time the readers get to observe EOF after a cancelled child was reaped
const DRAIN_GRACE: Duration = Duration::from_millis(500);
const READ_CHUNK: usize = 8 * 1024;

/// Collection did not produce a usable result
#[derive(Debug, Error)]
pub enum CollectError {
    /// Cancellation was requested while waiting
    #[error("cancelled while waiting for the child")]
    Cancelled,

    /// Waiting for the child (or starting a reader) failed
    #[error("failed to wait for the child: {0}")]
    Wait(#[source] io::Error),
}

/// Text captured from a child's standard streams
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Everything the child wrote to stdout
    pub stdout: String,
    /// Everything the child wrote to stderr
    pub stderr: String,
}

/// A child that exited with both streams drained
#[derive(Debug)]
pub struct Collected {
    /// Exit status of the child
    pub status: ExitStatus,
    /// Captured stdout/stderr (whatever was read before a read error)
    pub output: CapturedOutput,
    /// Error that cut the stdout drain short, if any
    pub stdout_error: Option<io::Error>,
}

/// Result handed back by a reader thread
type Drained = (Vec<u8>, Option<io::Error>);

/// Wait for `child` to exit and drain its piped stdout/stderr.
///
/// Returns `CollectError::Cancelled` if `cancel` fires before both the exit
/// and the stdout EOF were observed; the child is terminated and reaped.
pub fn collect(mut child: Child, cancel: &CancelToken) -> Result<Collected, CollectError> {
    let stdout = match spawn_reader("stdout", child.stdout.take()) {
        Ok(handle) => handle,
        Err(e) => {
            terminate(&mut child);
            return Err(CollectError::Wait(e));
        }
    };
    let stderr = match spawn_reader("stderr", child.stderr.take()) {
        Ok(handle) => handle,
        Err(e) => {
            terminate(&mut child);
            return Err(CollectError::Wait(e));
        }
    };

    let status = loop {
        if cancel.is_cancelled() {
            terminate(&mut child);
            await_readers(&[&stdout, &stderr], DRAIN_GRACE);
            return Err(CollectError::Cancelled);
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                terminate(&mut child);
                return Err(CollectError::Wait(e));
            }
        }
    };

    // EOF, not exit, completes the buffer: a descendant may still hold the pipe.
    while !(stdout.is_finished() && stderr.is_finished()) {
        if cancel.is_cancelled() {
            return Err(CollectError::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    }

    let (stdout_bytes, stdout_error) = join_reader(stdout);
    let (stderr_bytes, _) = join_reader(stderr);

    Ok(Collected {
        status,
        output: CapturedOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        },
        stdout_error,
    })
}

fn spawn_reader<R>(name: &str, stream: Option<R>) -> io::Result<JoinHandle<Drained>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("asmscope-{name}"))
        .spawn(move || match stream {
            Some(stream) => drain(stream),
            None => (Vec::new(), None),
        })
}

/// Read `stream` to EOF, keeping whatever arrived before an error
fn drain(mut stream: impl Read) -> Drained {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return (buffer, None),
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (buffer, Some(e)),
        }
    }
}

fn join_reader(handle: JoinHandle<Drained>) -> Drained {
    handle.join().unwrap_or_else(|_| {
        (
            Vec::new(),
            Some(io::Error::other("output reader thread panicked")),
        )
    })
}

/// Give finished readers a moment; unfinished ones are left detached
fn await_readers(handles: &[&JoinHandle<Drained>], grace: Duration) {
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline && !handles.iter().all(|h| h.is_finished()) {
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM, brief wait, then SIGKILL; always reaps the child.
fn terminate(child: &mut Child) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }

    #[cfg(unix)]
    {
        let _ = send_sigterm(child.id());
        thread::sleep(TERMINATE_GRACE);
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
    }

    let _ = child.kill();
    let _ = child.wait();
}

/// Send SIGTERM to a process. Returns `Err` if the signal could not be delivered.
#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<(), io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn sh(script: &str) -> Child {
        Command::new("/bin/sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    #[test]
    fn test_collects_both_streams() {
        let collected = collect(
            sh("printf 'to stdout'; printf 'to stderr' >&2; exit 13"),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(collected.status.code(), Some(13));
        assert_eq!(collected.output.stdout, "to stdout");
        assert_eq!(collected.output.stderr, "to stderr");
        assert!(collected.stdout_error.is_none());
    }

    #[test]
    fn test_large_output_does_not_deadlock() {
        let collected = collect(
            sh("head -c 200000 /dev/zero | tr '\\0' x; head -c 100000 /dev/zero | tr '\\0' y >&2"),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(collected.status.success());
        assert_eq!(collected.output.stdout.len(), 200_000);
        assert!(collected.output.stdout.bytes().all(|b| b == b'x'));
        assert_eq!(collected.output.stderr.len(), 100_000);
    }

    #[test]
    fn test_empty_output() {
        let collected = collect(sh("exit 0"), &CancelToken::new()).unwrap();
        assert_eq!(collected.output, CapturedOutput::default());
    }

    #[test]
    fn test_non_utf8_is_lossy() {
        let collected = collect(sh("printf 'a\\377b'"), &CancelToken::new()).unwrap();
        assert_eq!(collected.output.stdout, "a\u{FFFD}b");
    }

    #[test]
    fn test_cancel_while_waiting() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let started = Instant::now();
        let result = collect(sh("exec sleep 30"), &cancel);
        canceller.join().unwrap();

        assert!(matches!(result, Err(CollectError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_already_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = collect(sh("exec sleep 30"), &cancel);
        assert!(matches!(result, Err(CollectError::Cancelled)));
    }

    #[test]
    fn test_drain_keeps_partial_data_on_error() {
        struct Flaky(bool);
        impl Read for Flaky {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0 {
                    return Err(io::Error::other("boom"));
                }
                self.0 = true;
                buf[..3].copy_from_slice(b"abc");
                Ok(3)
            }
        }

        let (bytes, error) = drain(Flaky(false));
        assert_eq!(bytes, b"abc");
        assert_eq!(error.unwrap().to_string(), "boom");
    }
}
