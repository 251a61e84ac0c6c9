use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A spinning read-write lock for `no_std` environments.
///
/// Any number of readers, or one writer. A pending writer blocks new
/// readers, so a steady stream of readers cannot starve it.
///
/// Readers never mask interrupts, which makes the read side usable from
/// completion handlers as long as writers only run in process context and
/// keep their critical sections short.
///
/// # Type Parameters
///
/// * `T` - The type of data protected by the read-write lock.
pub struct RwLock<T> {
    reader_count: AtomicUsize,
    writer_lock: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: readers hand out `&T` across threads, so `T: Sync` is needed too
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}
unsafe impl<T: Send> Send for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates a new `RwLock` wrapping the provided data.
    pub const fn new(data: T) -> Self {
        Self {
            reader_count: AtomicUsize::new(0),
            writer_lock: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires shared access, spinning while a writer holds or waits for
    /// the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        loop {
            while self.writer_lock.load(Ordering::Acquire) {
                core::hint::spin_loop();
            }

            self.reader_count.fetch_add(1, Ordering::AcqRel);

            // A writer may have slipped in between the check and the
            // increment; back out and let it finish.
            if !self.writer_lock.load(Ordering::Acquire) {
                return RwLockReadGuard { lock: self };
            }
            self.reader_count.fetch_sub(1, Ordering::Release);
        }
    }

    /// Acquires exclusive access.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        while self
            .writer_lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        while self.reader_count.load(Ordering::Acquire) > 0 {
            core::hint::spin_loop();
        }

        RwLockWriteGuard { lock: self }
    }

    /// Mutable access without locking, for callers that own the lock
    /// exclusively.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// Shared access guard returned by [`RwLock::read`].
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

/// Exclusive access guard returned by [`RwLock::write`].
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> core::ops::Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: no writer can hold the lock while a reader is counted
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.reader_count.fetch_sub(1, Ordering::Release);
    }
}

impl<T> core::ops::Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the writer flag is held and all readers have drained
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> core::ops::DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: the writer flag is held and all readers have drained
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.writer_lock.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn readers_share_access() {
        let lock = RwLock::new(5);
        let a = lock.read();
        let b = lock.read();
        assert_eq!(*a + *b, 10);
    }

    #[test]
    fn writer_waits_for_readers() {
        let lock = Arc::new(RwLock::new(0u32));
        let reader = lock.read();

        let writer = {
            let lock = lock.clone();
            thread::spawn(move || {
                *lock.write() = 9;
            })
        };

        assert_eq!(*reader, 0);
        drop(reader);
        writer.join().unwrap();
        assert_eq!(*lock.read(), 9);
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let lock = Arc::new(RwLock::new(0u64));

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        if i % 2 == 0 {
                            *lock.write() += 1;
                        } else {
                            let _ = *lock.read();
                        }
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(*lock.read(), 10_000);
    }
}
