//! The rendered-homepage snapshot cell.
//!
//! One immutable buffer holds the last fully rendered homepage. Readers
//! take a cheap clone of the current buffer; a refresh builds a brand-new
//! buffer and swaps the reference, so a concurrent reader either sees the
//! old render or the new one, never a partial write.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tracing::warn;

const SOURCE: &str = "application::snapshot";

pub struct SnapshotCell {
    current: RwLock<Bytes>,
}

impl SnapshotCell {
    pub fn new(initial: Bytes) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// The current snapshot. `Bytes` clones share the underlying buffer,
    /// so this is a reference-count bump, not a copy.
    pub fn current(&self) -> Bytes {
        rw_read(&self.current, "current").clone()
    }

    /// Swap in a freshly rendered buffer. The old buffer stays alive for
    /// any in-flight responses still holding a clone of it.
    pub fn replace(&self, next: Bytes) {
        *rw_write(&self.current, "replace") = next;
    }
}

fn rw_read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = SOURCE,
                lock_kind = "rwlock.read",
                result = "poisoned_recovered",
                "Recovered from poisoned snapshot lock"
            );
            poisoned.into_inner()
        }
    }
}

fn rw_write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = SOURCE,
                lock_kind = "rwlock.write",
                result = "poisoned_recovered",
                "Recovered from poisoned snapshot lock"
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn readers_see_the_initial_snapshot() {
        let cell = SnapshotCell::new(Bytes::from_static(b"<html>first</html>"));
        assert_eq!(cell.current(), Bytes::from_static(b"<html>first</html>"));
    }

    #[test]
    fn replace_swaps_the_whole_buffer() {
        let cell = SnapshotCell::new(Bytes::from_static(b"old"));
        let held = cell.current();

        cell.replace(Bytes::from_static(b"new"));

        // The in-flight reader keeps the buffer it took; new readers see
        // the replacement.
        assert_eq!(held, Bytes::from_static(b"old"));
        assert_eq!(cell.current(), Bytes::from_static(b"new"));
    }

    #[test]
    fn concurrent_readers_only_ever_observe_complete_buffers() {
        let cell = Arc::new(SnapshotCell::new(render(0)));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let cell = Arc::clone(&cell);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    let bytes = cell.current();
                    let text = std::str::from_utf8(&bytes).expect("utf8");
                    let n: usize = text
                        .trim_start_matches("<html>")
                        .trim_end_matches("</html>")
                        .parse()
                        .expect("well-formed snapshot");
                    assert_eq!(bytes, render(n));
                }
            }));
        }

        for n in 1..1000 {
            cell.replace(render(n));
        }

        for handle in handles {
            handle.join().expect("reader thread");
        }
    }

    fn render(n: usize) -> Bytes {
        Bytes::from(format!("<html>{n}</html>"))
    }
}
