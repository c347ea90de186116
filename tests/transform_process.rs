//! End-to-end transforms against shell scripts standing in for Tesseract.
//! The scripts see the source path as `$0` and the target path as `$1`.
#![cfg(unix)]

use ocr_worker::{
    TransformError,
    availability::AvailabilityMonitor,
    command::{CommandTemplate, ProcessRunner},
    content::{ContentReader, FileReader, FileWriter, TempDirProvider},
    executor::{TransformExecutor, tool_output_path},
    mimetype::StaticMimetypes,
    worker::TransformWorker,
};
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn tool(script: &str) -> CommandTemplate {
    CommandTemplate::parse("/bin/sh", &["-c", script, "${source}", "${target}"]).unwrap()
}

fn worker(script: &str, scratch: &Path, timeout: Duration) -> TransformWorker<ProcessRunner> {
    let check = CommandTemplate::parse("/bin/sh", &["-c", "exit 0"]).unwrap();
    TransformWorker::new(
        TransformExecutor::new(tool(script), ProcessRunner),
        AvailabilityMonitor::new(check, ProcessRunner, Duration::from_secs(120)),
        Box::new(StaticMimetypes),
        Box::new(TempDirProvider::new(Some(scratch.to_path_buf()))),
        timeout,
    )
}

/// A zombie counts as gone: it has been killed, only its reaping is pending.
fn is_running(pid: &str) -> bool {
    if Path::new("/proc/self/stat").exists() {
        return match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            // The state field follows the parenthesized command name.
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| !rest.trim_start().starts_with('Z')),
            Err(_) => false,
        };
    }
    Command::new("kill")
        .args(["-0", pid])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn gone_within(pid: &str, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if !is_running(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    !is_running(pid)
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan.png"), b"\x89PNG fake").unwrap();
        std::fs::create_dir(dir.path().join("scratch")).unwrap();
        Self { dir }
    }

    fn reader(&self) -> FileReader {
        FileReader::new(self.dir.path().join("scan.png"), "image/png")
    }

    fn writer(&self) -> FileWriter {
        FileWriter::new(self.dir.path().join("result.txt"), "text/plain")
    }

    fn scratch(&self) -> std::path::PathBuf {
        self.dir.path().join("scratch")
    }

    fn run(&self, script: &str, timeout: Duration) -> (Result<(), TransformError>, FileWriter) {
        let w = worker(script, &self.scratch(), timeout);
        let mut out = self.writer();
        let res = w.transform(&self.reader(), &mut out);
        (res, out)
    }
}

#[test]
fn clean_exit_produces_tool_output() {
    let fx = Fixture::new();
    let (res, out) = fx.run("printf 'hello from ocr' > \"$1.txt\"", Duration::from_secs(10));
    res.unwrap();
    assert_eq!(std::fs::read_to_string(out.path()).unwrap(), "hello from ocr");
}

#[test]
fn source_content_is_staged_for_the_tool() {
    let fx = Fixture::new();
    let (res, out) = fx.run("cat \"$0\" > \"$1.txt\"", Duration::from_secs(10));
    res.unwrap();
    assert_eq!(std::fs::read(out.path()).unwrap(), b"\x89PNG fake");
}

#[test]
fn nonzero_exit_with_stderr_is_tool_failure() {
    let fx = Fixture::new();
    let (res, _) = fx.run(
        "echo 'Error in pixReadStream: Unknown format' >&2; exit 1",
        Duration::from_secs(10),
    );
    match res.unwrap_err() {
        TransformError::ToolReportedFailure { exit_code, stderr } => {
            assert_eq!(exit_code, Some(1));
            assert!(stderr.contains("Unknown format"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn nonzero_exit_without_stderr_is_success() {
    let fx = Fixture::new();
    let (res, out) = fx.run("printf 'warned text' > \"$1.txt\"; exit 1", Duration::from_secs(10));
    res.unwrap();
    assert_eq!(std::fs::read_to_string(out.path()).unwrap(), "warned text");
}

#[test]
fn missing_output_is_detected_at_write_back() {
    let fx = Fixture::new();
    let (res, out) = fx.run("exit 0", Duration::from_secs(10));
    assert!(matches!(res.unwrap_err(), TransformError::OutputMissing { .. }));
    assert!(!out.path().exists());
}

#[test]
fn missing_binary_is_launch_failure() {
    let fx = Fixture::new();
    let check = CommandTemplate::parse("/bin/sh", &["-c", "exit 0"]).unwrap();
    let bad = CommandTemplate::parse("/nonexistent/tesseract", &["${source}", "${target}"]).unwrap();
    let w = TransformWorker::new(
        TransformExecutor::new(bad, ProcessRunner),
        AvailabilityMonitor::new(check, ProcessRunner, Duration::from_secs(120)),
        Box::new(StaticMimetypes),
        Box::new(TempDirProvider::new(Some(fx.scratch()))),
        Duration::from_secs(10),
    );
    let err = w.transform(&fx.reader(), &mut fx.writer()).unwrap_err();
    assert!(matches!(err, TransformError::LaunchFailure(_)));
}

#[test]
fn unsupported_pair_is_rejected_before_running() {
    let fx = Fixture::new();
    let w = worker("touch \"$0.ran\"", &fx.scratch(), Duration::from_secs(10));
    let reader = FileReader::new(fx.dir.path().join("scan.png"), "application/pdf");
    let err = w.transform(&reader, &mut fx.writer()).unwrap_err();
    assert!(matches!(err, TransformError::Unsupported { .. }));
    assert_eq!(std::fs::read_dir(fx.scratch()).unwrap().count(), 0);
}

#[test]
fn timeout_kills_the_tool() {
    let fx = Fixture::new();
    let pid_file = fx.dir.path().join("tool.pid");
    let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
    let (res, _) = fx.run(&script, Duration::from_millis(300));
    assert!(matches!(res.unwrap_err(), TransformError::Timeout { .. }));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(gone_within(pid.trim(), Duration::from_secs(2)), "tool process {} still running", pid.trim());
}

#[test]
fn timeout_kills_background_jobs_of_the_tool() {
    let fx = Fixture::new();
    let pid_file = fx.dir.path().join("job.pid");
    let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
    let (res, _) = fx.run(&script, Duration::from_millis(300));
    assert!(matches!(res.unwrap_err(), TransformError::Timeout { .. }));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(gone_within(pid.trim(), Duration::from_secs(2)), "background job {} still running", pid.trim());
}

#[test]
fn background_job_holding_output_pipes_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.png");
    let target = dir.path().join("out.txt");
    let pid_file = dir.path().join("job.pid");
    std::fs::write(&source, b"img").unwrap();

    let script = format!("sleep 5 & echo $! > '{}'; printf hi > \"$1.txt\"", pid_file.display());
    let exec = TransformExecutor::new(tool(&script), ProcessRunner);
    let started = Instant::now();
    let err = exec.transform(&source, &target, Duration::from_millis(300)).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    assert!(matches!(err, TransformError::Timeout { .. }));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(gone_within(pid.trim(), Duration::from_secs(2)), "background job {} still running", pid.trim());
}

#[test]
fn executor_moves_suffixed_output_onto_target() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.png");
    let target = dir.path().join("out.txt");
    std::fs::write(&source, b"img").unwrap();

    let exec = TransformExecutor::new(tool("printf 'ocr text' > \"$1.txt\""), ProcessRunner);
    exec.transform(&source, &target, Duration::from_secs(10)).unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "ocr text");
    assert!(!tool_output_path(&target).exists());
}

#[test]
fn availability_uses_check_command() {
    let ok = AvailabilityMonitor::new(
        CommandTemplate::parse("/bin/sh", &["-c", "exit 0"]).unwrap(),
        ProcessRunner,
        Duration::from_secs(120),
    );
    assert!(ok.is_available());

    let missing = AvailabilityMonitor::new(
        CommandTemplate::parse::<&str>("/nonexistent/tesseract", &[]).unwrap(),
        ProcessRunner,
        Duration::from_secs(120),
    );
    assert!(!missing.is_available());
    assert!(missing.snapshot().last_checked.is_some());
}

#[test]
fn concurrent_transforms_are_independent() {
    let fx = Fixture::new();
    let w = std::sync::Arc::new(worker(
        "cat \"$0\" > \"$1.txt\"",
        &fx.scratch(),
        Duration::from_secs(10),
    ));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let w = w.clone();
            let base = fx.dir.path().to_path_buf();
            std::thread::spawn(move || {
                let input = base.join(format!("in-{i}.png"));
                std::fs::write(&input, format!("page {i}")).unwrap();
                let reader = FileReader::new(&input, "image/png");
                let mut out = FileWriter::new(base.join(format!("out-{i}.txt")), "text/plain");
                w.transform(&reader, &mut out).unwrap();
                assert_eq!(std::fs::read_to_string(out.path()).unwrap(), format!("page {i}"));
                assert_eq!(reader.mimetype(), "image/png");
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}
