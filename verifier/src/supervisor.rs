//! Process supervisor: owns one verifier child process.
//!
//! Three tasks per process feed a single event channel:
//!
//! - stdout reader: one [`ProcessOutput::Stdout`] per record;
//! - stderr reader: one [`ProcessOutput::Stderr`] per chunk;
//! - waiter: waits for exit (or a kill request), lets both readers drain, then
//!   sends exactly one [`ProcessOutput::Exited`].
//!
//! Every event is tagged with the session that spawned the process, so the
//! controller can drop events from a process it has already superseded.
//!
//! Readers never give up on a pending send: the channel is bounded and a
//! host may drain it late. Only a pipe that stays silent after the child
//! exited is abandoned.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::codec::{ChunkReader, LineReader};
use crate::error::SpawnError;
use crate::invocation::Invocation;
use crate::types::{SessionId, Termination};

/// How long a pipe may stay silent after the child is gone. A grandchild
/// holding the pipes open must not delay the exit event forever.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub(crate) struct SupervisorEvent {
    pub session: SessionId,
    pub output: ProcessOutput,
}

#[derive(Debug)]
pub(crate) enum ProcessOutput {
    Stdout(String),
    Stderr(String),
    Exited(Termination),
}

/// Handle to a live verifier process.
///
/// Dropping the handle kills the process.
pub(crate) struct ProcessHandle {
    session: SessionId,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// A handle with no process behind it, for driving the controller from
    /// hand-fed events.
    #[cfg(test)]
    pub(crate) fn detached(session: SessionId) -> Self {
        let (kill_tx, _) = oneshot::channel();
        Self {
            session,
            pid: None,
            kill_tx: Some(kill_tx),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request a forceful kill. Idempotent: only the first call signals.
    pub fn kill(&mut self) -> bool {
        match self.kill_tx.take() {
            Some(tx) => {
                tracing::debug!(session = %self.session, pid = ?self.pid, "Killing verifier");
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

pub(crate) fn spawn(
    invocation: &Invocation,
    session: SessionId,
    event_tx: mpsc::Sender<SupervisorEvent>,
) -> Result<ProcessHandle, SpawnError> {
    let mut cmd = Command::new(invocation.program());
    cmd.args(invocation.args())
        .envs(invocation.env().iter().map(|(key, value)| (*key, value)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| SpawnError::from_io(invocation.program().to_path_buf(), e))?;
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or(SpawnError::MissingPipe { stream: "stdout" })?;
    let stderr = child
        .stderr
        .take()
        .ok_or(SpawnError::MissingPipe { stream: "stderr" })?;

    tracing::info!(
        session = %session,
        pid = ?pid,
        program = %invocation.program().display(),
        "Verifier started"
    );

    let (exited_tx, exited_rx) = watch::channel(false);
    let stdout_task = tokio::spawn(read_records(
        stdout,
        session,
        event_tx.clone(),
        exited_rx.clone(),
    ));
    let stderr_task = tokio::spawn(read_chunks(stderr, session, event_tx.clone(), exited_rx));

    // The waiter owns the child; dropping its handle detaches it.
    let (kill_tx, kill_rx) = oneshot::channel();
    tokio::spawn(wait_for_exit(
        child,
        kill_rx,
        exited_tx,
        [stdout_task, stderr_task],
        session,
        event_tx,
    ));

    Ok(ProcessHandle {
        session,
        pid,
        kill_tx: Some(kill_tx),
    })
}

/// Await one pipe read.
///
/// Returns `None` when the child has exited and the pipe then stayed silent
/// for [`DRAIN_TIMEOUT`].
async fn read_pipe<T>(
    read: impl Future<Output = T>,
    exited: &mut watch::Receiver<bool>,
) -> Option<T> {
    tokio::select! {
        biased;
        out = read => Some(out),
        () = silent_after_exit(exited) => None,
    }
}

async fn silent_after_exit(exited: &mut watch::Receiver<bool>) {
    // An error means the waiter is gone, which only happens after exit.
    let _ = exited.wait_for(|&exited| exited).await;
    tokio::time::sleep(DRAIN_TIMEOUT).await;
}

async fn read_records<R: AsyncRead + Unpin>(
    stdout: R,
    session: SessionId,
    event_tx: mpsc::Sender<SupervisorEvent>,
    mut exited: watch::Receiver<bool>,
) {
    let mut reader = LineReader::new(stdout);
    loop {
        let Some(read) = read_pipe(reader.next_line(), &mut exited).await else {
            tracing::debug!(session = %session, "Stdout still open after exit, abandoning");
            break;
        };
        match read {
            Ok(Some(line)) => {
                let event = SupervisorEvent {
                    session,
                    output: ProcessOutput::Stdout(line),
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(session = %session, "Verifier stdout read error: {e}");
                break;
            }
        }
    }
}

async fn read_chunks<R: AsyncRead + Unpin>(
    stderr: R,
    session: SessionId,
    event_tx: mpsc::Sender<SupervisorEvent>,
    mut exited: watch::Receiver<bool>,
) {
    let mut reader = ChunkReader::new(stderr);
    loop {
        let Some(read) = read_pipe(reader.next_chunk(), &mut exited).await else {
            tracing::debug!(session = %session, "Stderr still open after exit, abandoning");
            break;
        };
        match read {
            Ok(Some(chunk)) => {
                let event = SupervisorEvent {
                    session,
                    output: ProcessOutput::Stderr(chunk),
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(session = %session, "Verifier stderr read error: {e}");
                break;
            }
        }
    }
}

async fn wait_for_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exited_tx: watch::Sender<bool>,
    readers: [JoinHandle<()>; 2],
    session: SessionId,
    event_tx: mpsc::Sender<SupervisorEvent>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // A dropped handle counts as a kill request too.
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(session = %session, "Kill failed (already exited?): {e}");
            }
            child.wait().await
        }
    };

    let termination = match status {
        Ok(status) => status
            .code()
            .map_or(Termination::Signaled, Termination::Exited),
        Err(e) => Termination::Lost(e.to_string()),
    };

    // Readers bound their pipe reads from here on; sends stay unbounded so
    // every record reaches the channel before the exit event.
    exited_tx.send_replace(true);
    for reader in readers {
        if let Err(e) = reader.await {
            tracing::debug!(session = %session, "Reader task failed: {e}");
        }
    }

    tracing::info!(session = %session, termination = %termination, "Verifier exited");
    let _ = event_tx
        .send(SupervisorEvent {
            session,
            output: ProcessOutput::Exited(termination),
        })
        .await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn shell(script: &str) -> Invocation {
        Invocation::for_test(PathBuf::from("/bin/sh"), vec!["-c".into(), script.into()])
    }

    async fn collect(mut rx: mpsc::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = matches!(event.output, ProcessOutput::Exited(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_stdout_records_then_exit() {
        let (tx, rx) = mpsc::channel(16);
        let _handle = spawn(
            &shell("printf 'one\\ntwo\\n'; exit 3"),
            SessionId::FIRST,
            tx,
        )
        .unwrap();

        let events = collect(rx).await;
        let outputs: Vec<_> = events.iter().map(|e| &e.output).collect();
        assert!(matches!(outputs[0], ProcessOutput::Stdout(l) if l == "one"));
        assert!(matches!(outputs[1], ProcessOutput::Stdout(l) if l == "two"));
        assert!(matches!(
            outputs[2],
            ProcessOutput::Exited(Termination::Exited(3))
        ));
        assert!(events.iter().all(|e| e.session == SessionId::FIRST));
    }

    #[tokio::test]
    async fn test_stderr_is_reported_as_chunk() {
        let (tx, rx) = mpsc::channel(16);
        let _handle = spawn(&shell("echo boom >&2"), SessionId::FIRST, tx).unwrap();

        let events = collect(rx).await;
        assert!(
            events
                .iter()
                .any(|e| matches!(&e.output, ProcessOutput::Stderr(s) if s == "boom"))
        );
        assert!(matches!(
            events.last().unwrap().output,
            ProcessOutput::Exited(Termination::Exited(0))
        ));
    }

    #[tokio::test]
    async fn test_kill_delivers_single_exit() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut handle = spawn(&shell("sleep 30"), SessionId::FIRST, tx).unwrap();
        assert!(handle.pid().is_some());

        assert!(handle.kill());
        assert!(!handle.kill(), "second kill is a no-op");

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.output,
            ProcessOutput::Exited(Termination::Signaled)
        ));
        drop(handle);
        assert!(rx.recv().await.is_none(), "exactly one exit event");
    }

    #[tokio::test]
    async fn test_late_consumer_receives_every_record() {
        let (tx, rx) = mpsc::channel(16);
        let _handle = spawn(
            &shell("i=0; while [ $i -lt 100 ]; do echo line$i; i=$((i+1)); done"),
            SessionId::FIRST,
            tx,
        )
        .unwrap();

        // Let the child exit and the drain window pass with the channel full.
        tokio::time::sleep(DRAIN_TIMEOUT + Duration::from_secs(1)).await;

        let events = collect(rx).await;
        let lines: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.output {
                ProcessOutput::Stdout(line) => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 100);
        assert_eq!(lines[0], "line0");
        assert_eq!(lines[99], "line99");
        assert!(matches!(
            events.last().unwrap().output,
            ProcessOutput::Exited(Termination::Exited(0))
        ));
    }

    #[tokio::test]
    async fn test_grandchild_holding_pipe_does_not_block_exit() {
        let (tx, rx) = mpsc::channel(16);
        let _handle = spawn(&shell("sleep 30 & echo done"), SessionId::FIRST, tx).unwrap();

        let events = tokio::time::timeout(Duration::from_secs(10), collect(rx))
            .await
            .expect("exit is reported while the pipe is still held");
        assert!(
            events
                .iter()
                .any(|e| matches!(&e.output, ProcessOutput::Stdout(l) if l == "done"))
        );
        assert!(matches!(
            events.last().unwrap().output,
            ProcessOutput::Exited(Termination::Exited(0))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let (tx, _rx) = mpsc::channel(16);
        let inv = Invocation::for_test(PathBuf::from("/definitely/not/here/java"), vec![]);
        let err = spawn(&inv, SessionId::FIRST, tx).err().unwrap();
        assert!(matches!(err, SpawnError::NotFound { .. }));
    }
}
