use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{info, warn};

use crate::error::ContextError;
use crate::protocol::Outbound;
use crate::script::Stream;

/// How an external process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, when the process exited normally
    pub exit_code: Option<i32>,
}

/// Run `path` with `args` and relay its output as `stdout` events.
///
/// Standard error is merged into the same category. Returns once the process
/// has exited and both streams are drained.
pub fn run_process(
    path: &Path,
    args: &[String],
    events: &Outbound,
) -> Result<ProcessOutcome, ContextError> {
    let process_err = |source| ContextError::Process {
        path: path.to_path_buf(),
        source,
    };
    info!(program = %path.display(), ?args, "starting process");
    let mut child = Command::new(path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(process_err)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    thread::scope(|scope| {
        if let Some(stream) = stdout {
            scope.spawn(|| relay(stream, events));
        }
        if let Some(stream) = stderr {
            scope.spawn(|| relay(stream, events));
        }
    });

    let status = child.wait().map_err(process_err)?;
    info!(program = %path.display(), %status, "process exited");
    Ok(ProcessOutcome {
        exit_code: status.code(),
    })
}

fn relay(stream: impl Read, events: &Outbound) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                if let Err(err) = events.output(Stream::Stdout.category(), &text) {
                    warn!(error = %err, "dropping process output");
                    // keep the pipe empty so the child can run to completion
                    if let Err(err) = io::copy(&mut reader, &mut io::sink()) {
                        warn!(error = %err, "process output unreadable");
                    }
                    break;
                }
            }
            Err(err) => {
                warn!(error = %err, "process output unreadable");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Sink(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn outputs(sink: &Sink) -> Vec<serde_json::Value> {
        String::from_utf8(sink.0.lock().clone())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn merges_streams_into_stdout_events() {
        let sink = Sink::default();
        let events = Outbound::new(sink.clone());
        let args = vec!["-c".to_string(), "echo out; echo err 1>&2; exit 3".to_string()];
        let outcome = run_process(Path::new("/bin/sh"), &args, &events).unwrap();
        assert_eq!(outcome.exit_code, Some(3));

        let frames = outputs(&sink);
        let mut lines: Vec<&str> = frames
            .iter()
            .map(|frame| {
                assert_eq!(frame["event"], "output");
                assert_eq!(frame["body"]["category"], "stdout");
                frame["body"]["output"].as_str().unwrap()
            })
            .collect();
        lines.sort();
        assert_eq!(lines, vec!["err\n", "out\n"]);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "front end gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn output_is_drained_after_the_front_end_fails() {
        let events = Outbound::new(Broken);
        // far more than a pipe buffer on both streams
        let script = "yes out | head -n 200000; yes err | head -n 200000 1>&2; exit 4";
        let args = vec!["-c".to_string(), script.to_string()];
        let outcome = run_process(Path::new("/bin/sh"), &args, &events).unwrap();
        assert_eq!(outcome.exit_code, Some(4));
    }

    #[test]
    fn missing_program_is_a_context_error() {
        let events = Outbound::new(Sink::default());
        let err = run_process(Path::new("/definitely/not/here"), &[], &events).unwrap_err();
        assert!(matches!(err, ContextError::Process { .. }));
    }
}
