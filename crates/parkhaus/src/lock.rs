//! Readers-writer lock with writer preference.
//!
//! Admission works as a monitor: one std mutex guards the counters and every
//! release broadcasts on a [`Notify`], so each waiter re-checks its own
//! condition. A writer counts itself as waiting before it is admitted, and any
//! waiting writer keeps new readers out. A steady stream of readers therefore
//! cannot starve a writer: once the writer registers, no further reader is
//! admitted until it has held and released the lock.
//!
//! | State                        | New reader | New writer |
//! |------------------------------|------------|------------|
//! | idle                         | admitted   | admitted   |
//! | readers inside               | admitted   | waits      |
//! | readers inside, writer waits | waits      | waits      |
//! | writer active                | waits      | waits      |
//!
//! Writers are not queued in order; when several wait, whichever re-checks
//! first after a release wins. Acquisition has no timeout. Dropping a pending
//! `write()` future withdraws the writer and wakes the readers it was holding
//! back.
//!
//! The protected value lives in a std `RwLock`. The monitor only admits
//! compatible holders, so that inner lock never contends.

use std::ops::{Deref, DerefMut};
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock as StdRwLock};

use tokio::sync::Notify;

/// Admission counters of a [`WriterPreferringLock`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    /// Readers currently inside the critical section.
    pub readers: usize,
    /// A writer holds exclusive access.
    pub writer_active: bool,
    /// Writers blocked waiting to enter.
    pub writers_waiting: usize,
}

impl LockState {
    fn admits_reader(&self) -> bool {
        !self.writer_active && self.writers_waiting == 0
    }

    fn admits_writer(&self) -> bool {
        !self.writer_active && self.readers == 0
    }

    fn check(&self) {
        debug_assert!(
            !(self.writer_active && self.readers > 0),
            "writer admitted alongside {} readers",
            self.readers
        );
    }
}

/// Async readers-writer lock that prefers writers.
#[derive(Debug)]
pub struct WriterPreferringLock<T> {
    state: Mutex<LockState>,
    changed: Notify,
    data: StdRwLock<T>,
}

impl<T: Default> Default for WriterPreferringLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> WriterPreferringLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            changed: Notify::new(),
            data: StdRwLock::new(value),
        }
    }

    /// Acquire shared access, waiting while a writer is active or waiting.
    pub async fn read(&self) -> ReadGuard<'_, T> {
        loop {
            // Register for the broadcast before checking, so a release that
            // lands between the check and the await is not lost.
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();

            if let Some(guard) = self.try_read() {
                return guard;
            }
            notified.await;
        }
    }

    /// Acquire shared access only if no writer is active or waiting.
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        {
            let mut state = self.lock_state();
            if !state.admits_reader() {
                return None;
            }
            state.readers += 1;
            state.check();
        }

        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Some(ReadGuard {
            lock: self,
            data: Some(data),
        })
    }

    /// Acquire exclusive access.
    ///
    /// The writer is counted as waiting from the first poll, which blocks new
    /// readers even while earlier readers are still inside.
    pub async fn write(&self) -> WriteGuard<'_, T> {
        let mut pending = PendingWriter::register(self);

        loop {
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();

            if pending.try_admit() {
                break;
            }
            notified.await;
        }

        let data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        WriteGuard {
            lock: self,
            data: Some(data),
        }
    }

    /// Acquire exclusive access only if the lock is idle and no other writer
    /// is waiting for its turn.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        {
            let mut state = self.lock_state();
            if !state.admits_writer() || state.writers_waiting > 0 {
                return None;
            }
            state.writer_active = true;
            state.check();
        }

        let data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        Some(WriteGuard {
            lock: self,
            data: Some(data),
        })
    }

    /// Current admission counters.
    pub fn state(&self) -> LockState {
        *self.lock_state()
    }

    // Counters are only touched in sections that cannot panic, so a poisoned
    // mutex still holds consistent state.
    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_read(&self) {
        let last = {
            let mut state = self.lock_state();
            state.readers -= 1;
            state.readers == 0
        };
        if last {
            self.changed.notify_waiters();
        }
    }

    fn release_write(&self) {
        {
            let mut state = self.lock_state();
            state.writer_active = false;
        }
        self.changed.notify_waiters();
    }
}

/// A writer between registration and admission.
struct PendingWriter<'a, T> {
    lock: &'a WriterPreferringLock<T>,
    admitted: bool,
}

impl<'a, T> PendingWriter<'a, T> {
    fn register(lock: &'a WriterPreferringLock<T>) -> Self {
        lock.lock_state().writers_waiting += 1;
        Self {
            lock,
            admitted: false,
        }
    }

    fn try_admit(&mut self) -> bool {
        let mut state = self.lock.lock_state();
        if !state.admits_writer() {
            return false;
        }
        state.writers_waiting -= 1;
        state.writer_active = true;
        state.check();
        self.admitted = true;
        true
    }
}

impl<T> Drop for PendingWriter<'_, T> {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        {
            let mut state = self.lock.lock_state();
            state.writers_waiting -= 1;
        }
        tracing::debug!("Pending writer withdrawn");
        self.lock.changed.notify_waiters();
    }
}

/// Shared access to the value; releases on drop.
#[must_use = "guard will be immediately released if not held"]
pub struct ReadGuard<'a, T> {
    lock: &'a WriterPreferringLock<T>,
    data: Option<std::sync::RwLockReadGuard<'a, T>>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.data.as_deref().expect("guard accessed after drop")
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        // Release the inner guard before waking a writer that will take it.
        drop(self.data.take());
        self.lock.release_read();
    }
}

/// Exclusive access to the value; releases on drop.
#[must_use = "guard will be immediately released if not held"]
pub struct WriteGuard<'a, T> {
    lock: &'a WriterPreferringLock<T>,
    data: Option<std::sync::RwLockWriteGuard<'a, T>>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.data.as_deref().expect("guard accessed after drop")
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.data.as_deref_mut().expect("guard accessed after drop")
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        drop(self.data.take());
        self.lock.release_write();
    }
}
