use std::io::{self, Read};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `command` to completion, capturing stdout and stderr.
///
/// Unsuccessful exit (including death by signal) is an error. If `timeout`
/// is set, the child is killed once it has run that long. The limit also
/// covers draining the output pipes, which stay open as long as any process
/// the child spawned keeps them.
pub fn run(command: &mut Command, timeout: Option<Duration>) -> Result<Output, Error> {
    let text = format!("{:?}", command);
    debug!("Running {}", text);
    command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|e| Error::Spawn(text.clone(), e))?;
    let deadline = timeout.map(|limit| Instant::now() + limit);
    // Drain pipes while waiting so that a chatty child can't block on a full pipe
    let stdout = child.stdout.take().map(read_in_background);
    let stderr = child.stderr.take().map(read_in_background);
    let status = match deadline {
        None => child.wait()?,
        Some(deadline) => match wait_until(&mut child, deadline)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(timed_out(text, timeout));
            }
        },
    };
    let stdout = collect(stdout, deadline);
    let stderr = collect(stderr, deadline);
    let (stdout, stderr) = match (stdout, stderr) {
        (Some(out), Some(err)) => (out, err),
        _ => {
            warn!("Output of {} was still open after the process exited", text);
            return Err(timed_out(text, timeout));
        }
    };
    let output = Output {
        status,
        stdout,
        stderr,
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(Error::Toolchain(text, output.status, stderr));
    }
    Ok(output)
}

fn timed_out(command: String, timeout: Option<Duration>) -> Error {
    Error::TimedOut(command, timeout.unwrap_or_default())
}

fn wait_until(
    child: &mut std::process::Child,
    deadline: Instant,
) -> Result<Option<ExitStatus>, io::Error> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn read_in_background<R>(mut pipe: R) -> Receiver<Vec<u8>>
where R: Read + Send + 'static,
{
    let (send, recv) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = send.send(buf);
    });
    recv
}

/// Returns `None` if the pipe wasn't closed before `deadline`.
///
/// The reader thread is left behind in that case; it exits once the last
/// writer goes away.
fn collect(recv: Option<Receiver<Vec<u8>>>, deadline: Option<Instant>) -> Option<Vec<u8>> {
    let recv = match recv {
        Some(s) => s,
        None => return Some(Vec::new()),
    };
    let result = match deadline {
        None => recv.recv().map_err(|_| RecvTimeoutError::Disconnected),
        Some(deadline) => {
            recv.recv_timeout(deadline.saturating_duration_since(Instant::now()))
        }
    };
    match result {
        Ok(buf) => Some(buf),
        Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}
