//! Named background threads with a shutdown flag.
//!
//! Each `Worker` owns exactly one thread that is signalled and joined when the
//! `Worker` is dropped, so node contexts never leak threads.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

pub struct Worker {
    name: &'static str,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a thread named `name`. The body receives the shutdown
    /// flag and is expected to return soon after it is set.
    pub fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let join_handle = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                body(&flag);
                tracing::trace!(worker = name, "worker thread exiting cleanly");
            })?;
        Ok(Self {
            name,
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal shutdown without waiting for the thread.
    pub fn signal(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.signal();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!(worker = self.name, "worker joined"),
                Err(e) => tracing::warn!(worker = self.name, ?e, "worker panicked during shutdown"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn drop_signals_and_joins() {
        let w = Worker::spawn("spin", |stop| {
            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();
        assert!(!w.is_finished());
        drop(w);
    }

    #[test]
    fn finished_body_is_reported() {
        let w = Worker::spawn("once", |_| {}).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !w.is_finished() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(w.is_finished());
        assert_eq!(w.name(), "once");
    }
}
