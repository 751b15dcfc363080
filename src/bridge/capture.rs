// src/bridge/capture.rs

use std::{
    io::{self, Read},
    process::{Child, ExitStatus},
    thread,
    time::{Duration, Instant},
};

use crossbeam::channel::{self, select, Sender};

use super::cancel::CancelToken;
use crate::constants::{EXIT_POLL_INTERVAL, PIPE_READ_CHUNK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

enum PipeEvent {
    Data(Stream, Vec<u8>),
    Closed,
}

/// How the supervised process ended.
#[derive(Debug)]
pub(crate) enum Termination {
    Exited(ExitStatus),
    TimedOut,
    Overflowed,
    Cancelled,
    WaitFailed(io::Error),
}

impl Termination {
    /// Whether the child is still running and must be killed by the caller.
    pub(crate) fn needs_kill(&self) -> bool {
        !matches!(self, Termination::Exited(_))
    }
}

/// Output collected so far, bounded by a combined byte limit.
#[derive(Debug, Default)]
pub(crate) struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    limit: usize,
}

impl CapturedOutput {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }

    /// Appends as much of `bytes` as fits. Returns `false` once the limit has
    /// been exceeded; the overflowing tail is dropped.
    fn push(&mut self, stream: Stream, bytes: &[u8]) -> bool {
        let room = self.limit.saturating_sub(self.len());
        let take = bytes.len().min(room);
        let target = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        target.extend_from_slice(&bytes[..take]);
        take == bytes.len()
    }
}

/// Waits for `child` to finish while draining its stdout and stderr.
///
/// Returns as soon as the first of these happens: the process exits and both
/// pipes are closed, `timeout` elapses, combined output goes past `limit`, or
/// `cancel` fires. The child is NOT killed here; check
/// [`Termination::needs_kill`].
pub(crate) fn supervise(
    child: &mut Child,
    timeout: Duration,
    limit: usize,
    cancel: Option<&CancelToken>,
) -> (Termination, CapturedOutput) {
    let (sender, events) = channel::unbounded();
    let mut open = 0;

    if let Some(stdout) = child.stdout.take() {
        spawn_pipe_reader(Stream::Stdout, stdout, sender.clone());
        open += 1;
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_pipe_reader(Stream::Stderr, stderr, sender.clone());
        open += 1;
    }
    drop(sender);

    let deadline = channel::at(Instant::now() + timeout);
    let cancelled = cancel
        .map(|token| token.signal().clone())
        .unwrap_or_else(channel::never);
    let mut output = CapturedOutput::new(limit);

    let termination = loop {
        if open == 0 {
            // Both pipes hit EOF; the process is exiting or has exited.
            match child.try_wait() {
                Ok(Some(status)) => break Termination::Exited(status),
                Ok(None) => {}
                Err(e) => break Termination::WaitFailed(e),
            }
            select! {
                recv(deadline) -> _ => break Termination::TimedOut,
                recv(cancelled) -> _ => break Termination::Cancelled,
                default(EXIT_POLL_INTERVAL) => {}
            }
            continue;
        }

        select! {
            recv(events) -> event => match event {
                Ok(PipeEvent::Data(stream, bytes)) => {
                    if !output.push(stream, &bytes) {
                        break Termination::Overflowed;
                    }
                }
                Ok(PipeEvent::Closed) => open -= 1,
                Err(_) => open = 0,
            },
            recv(deadline) -> _ => break Termination::TimedOut,
            recv(cancelled) -> _ => break Termination::Cancelled,
        }
    };

    // Keep whatever was already read before the kill decision.
    if matches!(termination, Termination::TimedOut | Termination::Cancelled) {
        for event in events.try_iter() {
            if let PipeEvent::Data(stream, bytes) = event {
                if !output.push(stream, &bytes) {
                    break;
                }
            }
        }
    }

    (termination, output)
}

fn spawn_pipe_reader<R>(stream: Stream, mut pipe: R, sender: Sender<PipeEvent>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = vec![0u8; PIPE_READ_CHUNK];
        loop {
            match pipe.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    // Receiver gone means the job is over; stop reading.
                    if sender
                        .send(PipeEvent::Data(stream, buffer[..n].to_vec()))
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!("{:?} pipe read failed: {}", stream, e);
                    break;
                }
            }
        }
        let _ = sender.send(PipeEvent::Closed);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(events: channel::Receiver<PipeEvent>, limit: usize) -> (CapturedOutput, bool) {
        let mut output = CapturedOutput::new(limit);
        for event in events.iter() {
            if let PipeEvent::Data(stream, bytes) = event {
                if !output.push(stream, &bytes) {
                    return (output, true);
                }
            }
        }
        (output, false)
    }

    #[test]
    fn test_push_within_limit() {
        let mut output = CapturedOutput::new(10);
        assert!(output.push(Stream::Stdout, b"hello"));
        assert!(output.push(Stream::Stderr, b"world"));
        assert_eq!(output.len(), 10);
        assert_eq!(output.stdout, b"hello");
        assert_eq!(output.stderr, b"world");
    }

    #[test]
    fn test_push_truncates_at_limit() {
        let mut output = CapturedOutput::new(8);
        assert!(output.push(Stream::Stdout, b"hello"));
        assert!(!output.push(Stream::Stdout, b"world"));
        assert_eq!(output.stdout, b"hellowor");
        assert_eq!(output.len(), 8);
        assert!(!output.push(Stream::Stderr, b"!"));
        assert!(output.stderr.is_empty());
    }

    #[test]
    fn test_reader_streams_whole_input() {
        let (sender, receiver) = channel::unbounded();
        let data = vec![b'x'; PIPE_READ_CHUNK * 3 + 17];
        spawn_pipe_reader(Stream::Stdout, io::Cursor::new(data.clone()), sender);

        let (output, overflowed) = collect(receiver, usize::MAX);
        assert!(!overflowed);
        assert_eq!(output.stdout, data);
    }

    #[test]
    fn test_reader_overflow_is_reported() {
        let (sender, receiver) = channel::unbounded();
        spawn_pipe_reader(Stream::Stderr, io::Cursor::new(vec![b'y'; 100]), sender);

        let (output, overflowed) = collect(receiver, 40);
        assert!(overflowed);
        assert_eq!(output.stderr.len(), 40);
    }
}
