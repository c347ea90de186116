use super::{CommandRunner, CommandTemplate, ExecutionResult, Substitution};
use crate::error::ExecError;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the pipes to close once the process group is dead.
const KILL_GRACE: Duration = Duration::from_millis(200);

/// Runs templates as real child processes. No shell is involved; each
/// resolved argument is one argv entry.
///
/// On unix the child leads its own process group, so a timeout takes down
/// everything the tool started along with the tool itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        template: &CommandTemplate,
        subst: &Substitution,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecError> {
        let program = template.program();
        let args = template.resolve_args(subst)?;
        let timeout = timeout.or(template.default_timeout());
        debug!("exec {} args={:?} timeout={:?}", program, args, timeout);

        let mut cmd = Command::new(template.exe());
        cmd.args(&args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Launch {
            program: program.clone(),
            source,
        })?;

        wait_with_timeout(&mut child, &program, timeout)
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            // A read error mid-stream still leaves whatever was captured.
            let _ = r.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Waits for a reader to hit EOF, giving up at `deadline`.
fn collect(rx: &Receiver<Vec<u8>>, deadline: Option<Instant>) -> Option<String> {
    let bytes = match deadline {
        None => rx.recv().ok()?,
        Some(at) => rx
            .recv_timeout(at.saturating_duration_since(Instant::now()))
            .ok()?,
    };
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Kills the child and every process in its group, then reaps the child.
fn kill_tree(child: &mut Child, program: &str) -> Result<(), ExecError> {
    #[cfg(unix)]
    {
        let pgid = child.id() as libc::pid_t;
        // The child was spawned with process_group(0), so its pid is the pgid.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            debug!("killpg {} failed: {}", pgid, std::io::Error::last_os_error());
            let _ = child.kill();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
    child.wait().map_err(|source| ExecError::Wait {
        program: program.to_string(),
        source,
    })?;
    Ok(())
}

fn wait_with_timeout(
    child: &mut Child,
    program: &str,
    timeout: Option<Duration>,
) -> Result<ExecutionResult, ExecError> {
    // Drain pipes while waiting so a chatty tool can't deadlock on a full
    // stdout/stderr buffer.
    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());

    let start = Instant::now();
    let deadline = timeout.map(|limit| start + limit);
    let timed_out = |child: &mut Child, limit: Duration| -> Result<ExecutionResult, ExecError> {
        kill_tree(child, program)?;
        let stderr = collect(&stderr_rx, Some(Instant::now() + KILL_GRACE)).unwrap_or_default();
        Err(ExecError::Timeout {
            program: program.to_string(),
            timeout: limit,
            stderr,
        })
    };

    let status: ExitStatus = loop {
        let polled = child.try_wait().map_err(|source| ExecError::Wait {
            program: program.to_string(),
            source,
        })?;
        if let Some(status) = polled {
            break status;
        }

        if let (Some(at), Some(limit)) = (deadline, timeout) {
            if Instant::now() >= at {
                warn!("{} timed out after {:?}, killing pid {}", program, limit, child.id());
                return timed_out(child, limit);
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    };

    // Something the tool spawned may still hold the pipes after it exits;
    // the deadline covers that wait too.
    let stdout = collect(&stdout_rx, deadline);
    let stderr = collect(&stderr_rx, deadline);
    let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
        let limit = timeout.unwrap_or_default();
        warn!(
            "{} exited ({}) but its output pipes are still open after {:?}, killing its process group",
            program, status, limit
        );
        return timed_out(child, limit);
    };

    let result = ExecutionResult {
        exit_code: status.code(),
        stdout,
        stderr,
    };
    debug!("{} finished in {:?}: {}", program, start.elapsed(), result);
    Ok(result)
}
