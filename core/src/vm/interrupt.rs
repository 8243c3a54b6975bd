//! Cooperative interrupt queue (spec §5): polled at the top of every
//! fetch-decode-execute iteration so a driver on another thread can stop or
//! pause a running VM without the VM itself being concurrent.

use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Stop,
    Pause,
    Resume,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Poll {
    Continue,
    Stop,
}

/// The sending half, handed to whatever drives the VM (a REPL's Ctrl-C
/// handler, a timeout timer).
#[derive(Clone)]
pub struct InterruptHandle {
    tx: Sender<Interrupt>,
}

impl InterruptHandle {
    pub fn send(&self, interrupt: Interrupt) {
        let _ = self.tx.send(interrupt);
    }
}

pub struct InterruptQueue {
    rx: Receiver<Interrupt>,
}

impl InterruptQueue {
    pub fn new() -> (InterruptHandle, InterruptQueue) {
        let (tx, rx) = channel();
        (InterruptHandle { tx }, InterruptQueue { rx })
    }

    /// Drains everything queued so far. `Pause` blocks until `Resume`
    /// arrives, ignoring any other interrupt received in the meantime
    /// (including another `Stop`) per spec.
    pub fn poll(&self) -> Poll {
        loop {
            match self.rx.try_recv() {
                Ok(Interrupt::Stop) => {
                    tracing::trace!("interrupt delivered: stop");
                    return Poll::Stop;
                }
                Ok(Interrupt::Pause) => {
                    tracing::trace!("interrupt delivered: pause");
                    loop {
                        match self.rx.recv() {
                            Ok(Interrupt::Resume) => {
                                tracing::trace!("interrupt delivered: resume");
                                break;
                            }
                            Ok(_) => continue,
                            Err(_) => return Poll::Continue,
                        }
                    }
                }
                Ok(Interrupt::Resume) => {}
                Err(TryRecvError::Empty) => return Poll::Continue,
                Err(TryRecvError::Disconnected) => return Poll::Continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_recognised() {
        let (handle, queue) = InterruptQueue::new();
        handle.send(Interrupt::Stop);
        assert_eq!(queue.poll(), Poll::Stop);
    }

    #[test]
    fn no_pending_interrupt_continues() {
        let (_handle, queue) = InterruptQueue::new();
        assert_eq!(queue.poll(), Poll::Continue);
    }

    #[test]
    fn pause_then_resume_continues() {
        let (handle, queue) = InterruptQueue::new();
        handle.send(Interrupt::Pause);
        handle.send(Interrupt::Resume);
        assert_eq!(queue.poll(), Poll::Continue);
    }
}
