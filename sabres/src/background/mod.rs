use crate::error::{Result, SabresError};
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;

/// Outcome of an operation running on a worker thread.
pub struct Completion<T> {
    receiver: Receiver<Result<T>>,
    handle: JoinHandle<()>,
}

impl<T: Send + 'static> Completion<T> {
    pub fn spawn<F>(task: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, receiver) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            // The receiver may already be gone if nobody waits
            let _ = tx.send(task());
        });
        Completion { receiver, handle }
    }

    /// Block until the operation finishes and return its result.
    pub fn wait(self) -> Result<T> {
        let result = self.receiver.recv().unwrap_or_else(|_| {
            Err(SabresError::IllegalState(
                "Background operation panicked before completing".into(),
            ))
        });
        if self.handle.join().is_err() {
            log::warn!("Background worker panicked");
        }
        result
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Run `task` on a worker thread and pass its result to `callback` there.
pub fn spawn_with<T, F, C>(task: F, callback: C) -> JoinHandle<()>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
    C: FnOnce(Result<T>) + Send + 'static,
{
    std::thread::spawn(move || callback(task()))
}
