//! Write, shared and read sessions over a single protected value.

use std::fmt;
use std::ops::{Deref, DerefMut};
use tokio::sync::{Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock arbitrating between one mutator at a time and concurrent readers.
pub struct CoordinatorLock<T> {
    /// Held by every writer-side session for its whole lifetime.
    writer: Mutex<()>,
    state: RwLock<T>,
    released: Notify,
}

impl<T> CoordinatorLock<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            writer: Mutex::new(()),
            state: RwLock::new(value),
            released: Notify::new(),
        }
    }

    /// Acquire an exclusive write session.
    pub async fn write(&self) -> WriteSession<'_, T> {
        let writer = self.writer.lock().await;
        let guard = self.state.write().await;
        WriteSession {
            guard,
            state_lock: &self.state,
            _writer: writer,
            signal: ReleaseSignal(Some(&self.released)),
        }
    }

    /// Acquire a write session once `ready` holds for the protected value.
    ///
    /// While `ready` is false the session is released and the caller parks
    /// until another writer-side session is released, then retries.
    pub async fn write_when<F>(&self, mut ready: F) -> WriteSession<'_, T>
    where
        F: FnMut(&T) -> bool,
    {
        loop {
            let mut session = self.write().await;
            if ready(&*session) {
                return session;
            }
            // An unready session changed nothing, so its release wakes nobody
            session.signal.0 = None;
            let released = self.released.notified();
            tokio::pin!(released);
            // Register before releasing so the wakeup cannot be missed
            released.as_mut().enable();
            drop(session);
            released.await;
        }
    }

    /// Acquire a read session. Waits while a `WriteSession` is held.
    pub async fn read(&self) -> ReadSession<'_, T> {
        ReadSession {
            guard: self.state.read().await,
        }
    }
}

impl<T: Default> Default for CoordinatorLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for CoordinatorLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorLock").finish_non_exhaustive()
    }
}

/// Wakes `write_when` waiters when the owning session is dropped.
struct ReleaseSignal<'a>(Option<&'a Notify>);

impl Drop for ReleaseSignal<'_> {
    fn drop(&mut self) {
        if let Some(released) = self.0 {
            released.notify_waiters();
        }
    }
}

/// Exclusive access: no other writer and no reader.
pub struct WriteSession<'a, T> {
    // Field order is drop order: state, then writer, then the wakeup.
    guard: RwLockWriteGuard<'a, T>,
    state_lock: &'a RwLock<T>,
    _writer: MutexGuard<'a, ()>,
    signal: ReleaseSignal<'a>,
}

impl<'a, T> WriteSession<'a, T> {
    /// Let readers in while keeping other writers out.
    #[must_use]
    pub fn enable_reads(self) -> SharedSession<'a, T> {
        let WriteSession {
            guard,
            state_lock,
            _writer,
            signal,
        } = self;
        SharedSession {
            state: RwLockWriteGuard::downgrade(guard),
            state_lock,
            _writer,
            signal,
        }
    }
}

impl<T> Deref for WriteSession<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for WriteSession<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Writer-side session that admits concurrent readers.
pub struct SharedSession<'a, T> {
    state: RwLockReadGuard<'a, T>,
    state_lock: &'a RwLock<T>,
    _writer: MutexGuard<'a, ()>,
    signal: ReleaseSignal<'a>,
}

impl<'a, T> SharedSession<'a, T> {
    /// Shut readers out again, waiting for active readers to finish.
    pub async fn disable_reads(self) -> WriteSession<'a, T> {
        let SharedSession {
            state,
            state_lock,
            _writer,
            signal,
        } = self;
        drop(state);
        WriteSession {
            guard: state_lock.write().await,
            state_lock,
            _writer,
            signal,
        }
    }
}

impl<T> Deref for SharedSession<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

/// Read-only access, concurrent with other readers and shared sessions.
pub struct ReadSession<'a, T> {
    guard: RwLockReadGuard<'a, T>,
}

impl<T> Deref for ReadSession<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}
