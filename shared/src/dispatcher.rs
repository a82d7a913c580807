//! Control dispatcher
//!
//! Commands may be queued from any thread; a single writer drains the queue
//! onto the control socket in enqueue order.

use std::io::Write;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::control::ControlMessage;
use crate::error::{Error, Result};

/// Producer side of the control queue
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlSender {
    /// Queue a command; never blocks
    ///
    /// Fails only once the writer loop has exited.
    pub fn send(&self, msg: ControlMessage) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| Error::Control("control loop has stopped".into()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Writer loop for the control socket
pub struct ControlDispatcher<W> {
    writer: W,
    rx: mpsc::UnboundedReceiver<ControlMessage>,
    cancel: CancellationToken,
}

impl<W: Write> ControlDispatcher<W> {
    /// Create the queue and the loop that drains it into `writer`
    pub fn new(writer: W, cancel: CancellationToken) -> (ControlSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ControlSender { tx },
            Self {
                writer,
                rx,
                cancel,
            },
        )
    }

    /// Run the loop to completion on the current thread
    ///
    /// Builds a private single-threaded runtime; must not be called from
    /// inside another runtime.
    pub fn run(mut self) -> Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(self.process())
    }

    /// Drain the queue until cancelled, or until every sender is dropped
    ///
    /// Cancellation wins over pending commands; whatever is still queued at
    /// that point is discarded.
    pub async fn process(&mut self) -> Result<()> {
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Control loop cancelled");
                    return Ok(());
                }
                msg = self.rx.recv() => match msg {
                    Some(msg) => msg,
                    None => {
                        debug!("Control queue closed");
                        return Ok(());
                    }
                },
            };

            self.write(&msg)?;
        }
    }

    fn write(&mut self, msg: &ControlMessage) -> Result<()> {
        // Blocking write: nothing else is scheduled on this runtime
        let bytes = msg.to_bytes();
        self.writer
            .write_all(&bytes)
            .and_then(|_| self.writer.flush())
            .map_err(|e| {
                Error::Control(format!(
                    "failed to write {:?}: {}",
                    msg.message_type(),
                    e
                ))
            })?;

        trace!("Sent {:?} ({} bytes)", msg.message_type(), bytes.len());
        Ok(())
    }
}
