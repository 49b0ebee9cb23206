use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing::error;

use crate::{
    error::{PadError, Result},
    protocol::{self, Command},
    transport::PadTransport,
    types::PadMode,
};

/// Maximum number of pending write operations per connection
pub const QUEUE_CAPACITY: usize = 50;

/// Unconditional pause after every transport write
///
/// The pad drops or corrupts closely-spaced writes, so the writer paces
/// itself regardless of write success.
pub const INTER_WRITE_SPACING: Duration = Duration::from_millis(700);

/// Pause between starting the belt and the first speed change
///
/// Lets the pad's own startup beeps finish so the speed-change confirmation
/// beep is audible on its own.
pub const START_SETTLE_DELAY: Duration = Duration::from_millis(2500);

/// One entry in the write queue: an optional pacing delay, then an optional
/// frame
///
/// An op with no frame is a pure wait used to pace multi-step intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    /// Delay to observe before acting on this op
    pub delay: Duration,
    /// Frame to write, if any
    pub frame: Option<Bytes>,
}

impl WriteOp {
    /// An op that writes the given frame without a leading delay
    #[must_use]
    pub const fn frame(frame: Bytes) -> Self {
        Self {
            delay: Duration::ZERO,
            frame: Some(frame),
        }
    }

    /// A pure pacing delay
    #[must_use]
    pub const fn wait(delay: Duration) -> Self {
        Self { delay, frame: None }
    }
}

/// Producer handle for the bounded per-connection write queue
///
/// Cloneable; safe for multiple producers. Enqueueing suspends when the
/// queue is full — user-issued commands are never dropped, since losing one
/// would desynchronize device and UI state.
#[derive(Clone)]
pub struct CommandQueue {
    tx: mpsc::Sender<WriteOp>,
}

impl CommandQueue {
    /// Create a queue with the given capacity, returning the producer handle
    /// and the receiver for the single writer
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<WriteOp>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue one write op, suspending while the queue is full
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Disconnected`] if the writer has shut down.
    pub async fn push(&self, op: WriteOp) -> Result<()> {
        self.tx.send(op).await.map_err(|_| PadError::Disconnected)
    }
}

/// Expand a high-level command into ordered write ops
///
/// `last_mode` is the mode from the most recent status reading, if any. A
/// start issued while the pad is in standby prepends a mode change, because
/// standby ignores belt commands.
///
/// # Panics
///
/// Panics if a speed outside `[0, 6]` km/h is requested (caller contract).
#[must_use]
pub fn expand_command(command: Command, last_mode: Option<PadMode>) -> Vec<WriteOp> {
    match command {
        Command::Start { target_speed } => {
            let mut ops = Vec::with_capacity(4);
            if last_mode == Some(PadMode::Standby) {
                ops.push(WriteOp::frame(protocol::set_mode(PadMode::Manual)));
            }
            ops.push(WriteOp::frame(protocol::start_belt()));
            ops.push(WriteOp::wait(START_SETTLE_DELAY));
            ops.push(WriteOp::frame(protocol::set_speed(target_speed)));
            ops
        }
        Command::Stop => vec![WriteOp::frame(protocol::set_speed(0.0))],
        Command::ChangeSpeed(speed) => vec![WriteOp::frame(protocol::set_speed(speed))],
    }
}

/// Drain the queue as the single writer for one connection
///
/// Exactly one writer runs per connection; a second writer would violate the
/// pacing invariant, which exclusive ownership of the receiver prevents by
/// construction. Exits when the queue closes or shutdown is signaled; all
/// sleeps are cancelable so teardown is prompt.
pub async fn run_writer(
    mut ops: mpsc::Receiver<WriteOp>,
    transport: Arc<dyn PadTransport>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let op = tokio::select! {
            _ = shutdown.changed() => break,
            op = ops.recv() => match op {
                Some(op) => op,
                None => break,
            },
        };

        if !op.delay.is_zero() {
            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(op.delay) => {}
            }
        }

        if let Some(frame) = op.frame {
            if let Err(err) = transport.write(&frame).await {
                // dropped, not retried; the next op proceeds after the spacing
                error!(error = %err, "error writing to bluetooth device");
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(INTER_WRITE_SPACING) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::{timeout, Instant};

    struct RecordingTransport {
        writes: Mutex<Vec<(Instant, Vec<u8>)>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                writes: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn opcodes(&self) -> Vec<u8> {
            self.writes.lock().unwrap().iter().map(|(_, f)| f[2]).collect()
        }
    }

    #[async_trait]
    impl PadTransport for RecordingTransport {
        async fn write(&self, frame: &[u8]) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((Instant::now(), frame.to_vec()));
            if self.fail {
                return Err(PadError::Protocol("injected".into()));
            }
            Ok(())
        }

        async fn is_connected(&self) -> bool {
            true
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_start_from_standby_expands_to_four_ops() {
        let ops = expand_command(
            Command::Start { target_speed: 2.5 },
            Some(PadMode::Standby),
        );
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].frame.as_ref().unwrap()[2], Opcode::SetMode as u8);
        assert_eq!(ops[0].frame.as_ref().unwrap()[3], PadMode::Manual as u8);
        assert_eq!(ops[1].frame.as_ref().unwrap()[2], Opcode::StartBelt as u8);
        assert_eq!(ops[2], WriteOp::wait(START_SETTLE_DELAY));
        assert_eq!(ops[3].frame.as_ref().unwrap()[2], Opcode::SetSpeed as u8);
        assert_eq!(ops[3].frame.as_ref().unwrap()[3], 25);
    }

    #[test]
    fn test_start_outside_standby_omits_mode_change() {
        for mode in [Some(PadMode::Manual), Some(PadMode::Auto), None] {
            let ops = expand_command(Command::Start { target_speed: 3.0 }, mode);
            assert_eq!(ops.len(), 3);
            assert_eq!(ops[0].frame.as_ref().unwrap()[2], Opcode::StartBelt as u8);
            assert_eq!(ops[1], WriteOp::wait(START_SETTLE_DELAY));
            assert_eq!(ops[2].frame.as_ref().unwrap()[2], Opcode::SetSpeed as u8);
        }
    }

    #[test]
    fn test_stop_is_speed_zero() {
        let ops = expand_command(Command::Stop, Some(PadMode::Manual));
        assert_eq!(ops.len(), 1);
        let frame = ops[0].frame.as_ref().unwrap();
        assert_eq!(frame[2], Opcode::SetSpeed as u8);
        assert_eq!(frame[3], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_preserves_order_and_spacing() {
        let transport = RecordingTransport::new();
        let (queue, rx) = CommandQueue::bounded(QUEUE_CAPACITY);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        queue.push(WriteOp::frame(protocol::start_belt())).await.unwrap();
        queue.push(WriteOp::frame(protocol::set_speed(2.0))).await.unwrap();
        drop(queue);

        run_writer(rx, transport.clone(), shutdown_rx).await;

        let writes = transport.writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].1[2], Opcode::StartBelt as u8);
        assert_eq!(writes[1].1[2], Opcode::SetSpeed as u8);
        assert!(writes[1].0 - writes[0].0 >= INTER_WRITE_SPACING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_honors_wait_ops() {
        let transport = RecordingTransport::new();
        let (queue, rx) = CommandQueue::bounded(QUEUE_CAPACITY);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let begin = Instant::now();
        queue.push(WriteOp::wait(START_SETTLE_DELAY)).await.unwrap();
        queue.push(WriteOp::frame(protocol::set_speed(1.0))).await.unwrap();
        drop(queue);

        run_writer(rx, transport.clone(), shutdown_rx).await;

        let writes = transport.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].0 - begin >= START_SETTLE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_continues_past_failed_writes() {
        let transport = Arc::new(RecordingTransport {
            writes: Mutex::new(Vec::new()),
            fail: true,
        });
        let (queue, rx) = CommandQueue::bounded(QUEUE_CAPACITY);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        queue.push(WriteOp::frame(protocol::start_belt())).await.unwrap();
        queue.push(WriteOp::frame(protocol::set_speed(2.0))).await.unwrap();
        drop(queue);

        run_writer(rx, transport.clone(), shutdown_rx).await;

        // both writes attempted despite the first failing
        assert_eq!(transport.opcodes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_stops_on_shutdown_during_delay() {
        let transport = RecordingTransport::new();
        let (queue, rx) = CommandQueue::bounded(QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        queue
            .push(WriteOp::wait(Duration::from_secs(3600)))
            .await
            .unwrap();
        queue.push(WriteOp::frame(protocol::set_speed(1.0))).await.unwrap();

        let writer = tokio::spawn(run_writer(rx, transport.clone(), shutdown_rx));
        tokio::task::yield_now().await;
        shutdown_tx.send(true).unwrap();

        timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer did not exit promptly")
            .unwrap();
        assert!(transport.writes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_backpressure_blocks_until_drained() {
        let (queue, mut rx) = CommandQueue::bounded(2);

        queue.push(WriteOp::frame(protocol::request_stats())).await.unwrap();
        queue.push(WriteOp::frame(protocol::request_stats())).await.unwrap();

        // queue full, no writer running: the producer must suspend
        let blocked = timeout(
            Duration::from_millis(100),
            queue.push(WriteOp::frame(protocol::request_stats())),
        )
        .await;
        assert!(blocked.is_err(), "push should block on a full queue");

        // draining one entry frees space for the producer
        rx.recv().await.unwrap();
        timeout(
            Duration::from_millis(100),
            queue.push(WriteOp::frame(protocol::request_stats())),
        )
        .await
        .expect("push should complete after a drain")
        .unwrap();
    }
}
