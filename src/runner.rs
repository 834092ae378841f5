//! Sandboxed browser subprocess.
//!
//! Every run gets a brand-new profile directory that is removed when the run
//! ends, and the only URL handed to the browser points at the loopback file
//! server. The untrusted content never chooses a URL, a flag or a path.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use url::Url;
use wait_timeout::ChildExt;

use crate::window::WindowSize;
use crate::{Error, RenderOptions, Result};

/// Flags passed on every run, before the mode-specific ones
const ISOLATION_FLAGS: &[&str] = &[
    "--headless",
    "--disable-gpu",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-extensions",
    "--disable-sync",
    "--disable-background-networking",
    "--disable-component-update",
    "--disable-default-apps",
    "--mute-audio",
    "--hide-scrollbars",
];

/// What the browser should produce
#[derive(Debug, Clone, Copy)]
pub enum Capture<'a> {
    /// Serialize the DOM to stdout once the page has loaded
    DomDump,
    /// Write a single PNG of the given window size to `output`
    Screenshot {
        window: WindowSize,
        output: &'a Path,
    },
}

/// `http://localhost:<port><entry_path>`; the entry path must be absolute
/// and cannot change the host.
pub fn target_url(port: u16, entry_path: &str) -> Result<Url> {
    if !entry_path.starts_with('/') {
        return Err(Error::InvalidArgument(format!(
            "entry path must start with '/': {:?}",
            entry_path
        )));
    }
    let mut url = Url::parse(&format!("http://localhost:{}/", port))
        .map_err(|e| Error::InvalidArgument(format!("bad target url: {}", e)))?;
    url.set_path(entry_path);
    Ok(url)
}

/// Run the browser in DOM-dump mode and return whatever it printed
pub fn run_eval(port: u16, options: &RenderOptions) -> Result<String> {
    let stdout = run(port, options, Capture::DomDump)?;
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// Run the browser in screenshot mode, writing the image to `output`
pub fn run_screenshot(
    port: u16,
    options: &RenderOptions,
    window: WindowSize,
    output: &Path,
) -> Result<()> {
    // a stale file must not pass for this run's screenshot
    match fs::remove_file(output) {
        Ok(()) => debug!("removed stale {}", output.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    run(port, options, Capture::Screenshot { window, output })?;
    if !output.is_file() {
        return Err(Error::MalformedOutput(format!(
            "browser exited cleanly but wrote no screenshot to {}",
            output.display()
        )));
    }
    Ok(())
}

fn run(port: u16, options: &RenderOptions, capture: Capture<'_>) -> Result<Vec<u8>> {
    let url = target_url(port, &options.entry_path)?;
    let profile = tempfile::Builder::new()
        .prefix("gensandbox-profile-")
        .tempdir()?;

    let args = build_args(profile.path(), capture, &url, &options.extra_args);
    debug!(
        "spawning {} {:?}",
        options.binary_path.display(),
        args
    );

    let mut command = Command::new(&options.binary_path);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // renderer and zygote helpers join the browser's group and die with it
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command
        .spawn()
        .map_err(|e| Error::launch_failure(&options.binary_path, e))?;

    let deadline = options.timeout.map(|limit| (Instant::now() + limit, limit));
    let stdout_reader = spawn_pipe_reader(child.stdout.take());
    let stderr_reader = spawn_pipe_reader(child.stderr.take());

    let status = match deadline {
        Some((_, limit)) => match child.wait_timeout(limit)? {
            Some(status) => status,
            None => {
                kill_process_tree(&mut child);
                return Err(timed_out(options, limit));
            }
        },
        None => child.wait()?,
    };
    // helpers left behind by a clean exit may still hold the pipes
    kill_process_group(child.id());

    let stdout = collect_pipe(stdout_reader, deadline).map_err(|e| relabel(e, options))?;
    let stderr = collect_pipe(stderr_reader, deadline).map_err(|e| relabel(e, options))?;
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    check_status(status, stderr, stdout)
}

fn timed_out(options: &RenderOptions, limit: Duration) -> Error {
    warn!(
        "{} killed after {:?}",
        options.binary_path.display(),
        limit
    );
    Error::Timeout(limit.as_millis() as u64)
}

fn relabel(err: Error, options: &RenderOptions) -> Error {
    match err {
        Error::Timeout(ms) => timed_out(options, Duration::from_millis(ms)),
        other => other,
    }
}

fn kill_process_tree(child: &mut Child) {
    kill_process_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_process_group(leader: u32) {
    if leader == 0 {
        return;
    }
    // SAFETY: plain signal delivery; ESRCH once the group is gone is ignored
    let _ = unsafe { libc::kill(-(leader as libc::pid_t), libc::SIGKILL) };
}

#[cfg(not(unix))]
fn kill_process_group(_leader: u32) {}

fn check_status(status: ExitStatus, stderr: String, stdout: Vec<u8>) -> Result<Vec<u8>> {
    if !status.success() {
        return Err(Error::SandboxExecution {
            exit_code: status.code(),
            stderr,
        });
    }
    if !stderr.trim().is_empty() {
        warn!("browser stderr: {}", stderr.trim());
    }
    Ok(stdout)
}

pub(crate) fn build_args(
    profile_dir: &Path,
    capture: Capture<'_>,
    url: &Url,
    extra_args: &[String],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = ISOLATION_FLAGS.iter().map(OsString::from).collect();

    let mut profile_flag = OsString::from("--user-data-dir=");
    profile_flag.push(profile_dir);
    args.push(profile_flag);

    match capture {
        Capture::DomDump => args.push("--dump-dom".into()),
        Capture::Screenshot { window, output } => {
            args.push(format!("--window-size={}", window).into());
            let mut shot = OsString::from("--screenshot=");
            shot.push(output);
            args.push(shot);
        }
    }

    args.extend(extra_args.iter().map(OsString::from));
    args.push(url.as_str().into());
    args
}

type PipeReader = Receiver<io::Result<Vec<u8>>>;

fn spawn_pipe_reader<R>(pipe: Option<R>) -> Option<PipeReader>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut stream| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let res = stream.read_to_end(&mut buf).map(|_| buf);
            let _ = tx.send(res);
        });
        rx
    })
}

/// Wait for a reader to hit EOF, no later than the run's deadline.
fn collect_pipe(reader: Option<PipeReader>, deadline: Option<(Instant, Duration)>) -> Result<Vec<u8>> {
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    let received = match deadline {
        Some((at, limit)) => match reader.recv_timeout(at.saturating_duration_since(Instant::now())) {
            Ok(res) => res,
            Err(RecvTimeoutError::Timeout) => return Err(Error::Timeout(limit.as_millis() as u64)),
            Err(RecvTimeoutError::Disconnected) => return Err(reader_gone()),
        },
        None => reader.recv().map_err(|_| reader_gone())?,
    };
    received.map_err(Error::from)
}

fn reader_gone() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::Other, "pipe reader panicked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args_as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn target_url_is_always_local() {
        let url = target_url(4321, "/index.html").unwrap();
        assert_eq!(url.as_str(), "http://localhost:4321/index.html");

        // a scheme-relative entry path must not switch hosts
        let url = target_url(4321, "//evil.example/x").unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(4321));

        assert!(matches!(target_url(1, "index.html"), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            target_url(1, "http://evil.example/"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn eval_args_dump_dom_with_fresh_profile() {
        let url = target_url(9000, "/index.html").unwrap();
        let args = args_as_strings(&build_args(
            Path::new("/tmp/profile-x"),
            Capture::DomDump,
            &url,
            &[],
        ));

        assert_eq!(args.first().map(String::as_str), Some("--headless"));
        assert!(args.contains(&"--user-data-dir=/tmp/profile-x".to_string()));
        assert!(args.contains(&"--dump-dom".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--screenshot")));
        assert!(!args.iter().any(|a| a == "--no-sandbox"));
        assert_eq!(args.last().unwrap(), "http://localhost:9000/index.html");
    }

    #[test]
    fn screenshot_args_carry_window_size_and_output() {
        let url = target_url(9000, "/index.html").unwrap();
        let out = PathBuf::from("/tmp/out.png");
        let args = args_as_strings(&build_args(
            Path::new("/tmp/p"),
            Capture::Screenshot {
                window: WindowSize { width: 1800, height: 2400 },
                output: &out,
            },
            &url,
            &["--force-device-scale-factor=1".to_string()],
        ));

        assert!(args.contains(&"--window-size=1800,2400".to_string()));
        assert!(args.contains(&"--screenshot=/tmp/out.png".to_string()));
        assert!(!args.contains(&"--dump-dom".to_string()));
        // extra args go before the url
        let n = args.len();
        assert_eq!(args[n - 2], "--force-device-scale-factor=1");
        assert_eq!(args[n - 1], "http://localhost:9000/index.html");
    }

    #[test]
    fn missing_binary_is_a_sandbox_execution_error() {
        let opts = RenderOptions {
            binary_path: PathBuf::from("/nonexistent/gensandbox-browser"),
            ..Default::default()
        };
        match run_eval(1, &opts) {
            Err(Error::SandboxExecution { exit_code, stderr }) => {
                assert_eq!(exit_code, None);
                assert!(stderr.contains("failed to launch"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
