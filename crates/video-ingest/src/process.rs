//! Child-process frame readers shared by the FFmpeg grabber engine and the
//! board camera driver.
//!
//! The child writes fixed-size raw frames to stdout. A background thread
//! slices stdout into frames and forwards them over a small bounded channel,
//! so a stalled device surfaces as a timed-out read instead of a hang.

use std::{
    io::Read,
    process::{Child, ChildStdout, Command, Stdio},
    thread,
    time::Duration,
};

use anyhow::anyhow;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::debug;

use crate::types::CaptureError;

const FRAME_QUEUE_DEPTH: usize = 2;
pub(crate) const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct ProcessReader {
    label: &'static str,
    child: Child,
    frames: Receiver<Result<Vec<u8>, CaptureError>>,
    pending: Option<Vec<u8>>,
    frame_timeout: Duration,
}

impl ProcessReader {
    /// Spawn `cmd` and wait for its first frame.
    ///
    /// The first frame is kept and handed out by the next [`Self::next_frame`]
    /// call; a child that exits or stays silent counts as an open failure.
    pub(crate) fn start(
        mut cmd: Command,
        frame_len: usize,
        label: &'static str,
        frame_timeout: Duration,
    ) -> Result<Self, CaptureError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|err| CaptureError::Open {
            uri: label.to_string(),
            reason: err.to_string(),
        })?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::Other(anyhow!("failed to capture {label} stdout")));
            }
        };

        let (tx, rx) = bounded(FRAME_QUEUE_DEPTH);
        let spawned = thread::Builder::new()
            .name(format!("{label}-reader"))
            .spawn(move || pump_frames(stdout, frame_len, tx));
        if let Err(err) = spawned {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::Other(err.into()));
        }

        let mut reader = Self {
            label,
            child,
            frames: rx,
            pending: None,
            frame_timeout,
        };
        match reader.recv() {
            Ok(first) => {
                reader.pending = Some(first);
                Ok(reader)
            }
            Err(err) => Err(CaptureError::Open {
                uri: label.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    pub(crate) fn next_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        self.recv()
    }

    fn recv(&self) -> Result<Vec<u8>, CaptureError> {
        match self.frames.recv_timeout(self.frame_timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Timeout(self.frame_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Read(format!(
                "{} frame reader stopped",
                self.label
            ))),
        }
    }
}

impl Drop for ProcessReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("{} process stopped", self.label);
    }
}

fn pump_frames(
    mut stdout: ChildStdout,
    frame_len: usize,
    tx: Sender<Result<Vec<u8>, CaptureError>>,
) {
    loop {
        let mut buffer = vec![0u8; frame_len];
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                if tx.send(Ok(buffer)).is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(CaptureError::Read(format!("stream ended: {err}"))));
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn frames_are_sliced_from_stdout() {
        let mut reader =
            ProcessReader::start(shell("printf abcdef"), 3, "test", FRAME_TIMEOUT).unwrap();
        assert_eq!(reader.next_frame().unwrap(), b"abc".to_vec());
        assert_eq!(reader.next_frame().unwrap(), b"def".to_vec());
        assert!(matches!(reader.next_frame(), Err(CaptureError::Read(_))));
    }

    #[test]
    fn silent_process_fails_to_open() {
        let err = ProcessReader::start(shell("exit 1"), 3, "test", FRAME_TIMEOUT).err().unwrap();
        assert!(matches!(err, CaptureError::Open { .. }));
    }

    #[test]
    fn missing_program_fails_to_open() {
        let cmd = Command::new("definitely-not-a-camera-binary");
        let err = ProcessReader::start(cmd, 3, "test", FRAME_TIMEOUT).err().unwrap();
        assert!(matches!(err, CaptureError::Open { .. }));
    }

    #[test]
    fn stalled_process_times_out() {
        let mut reader = ProcessReader::start(
            shell("printf abc; sleep 5"),
            3,
            "test",
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(reader.next_frame().is_ok());
        assert!(matches!(reader.next_frame(), Err(CaptureError::Timeout(_))));
    }
}
