use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
};

use super::irq::IrqControl;

/// IRQ-safe spinlock.
///
/// - Masks local interrupts before spinning
/// - Restores the saved interrupt state on drop
///
/// Meant for short critical sections shared with completion handlers that
/// may run in interrupt context. Never hold it across a call that can
/// sleep or re-enter the same lock.
///
/// Not fair. Not reentrant.
pub struct IrqSpinLock<T, I: IrqControl> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
    _irq: PhantomData<I>,
}

unsafe impl<T: Send, I: IrqControl> Send for IrqSpinLock<T, I> {}
unsafe impl<T: Send, I: IrqControl> Sync for IrqSpinLock<T, I> {}

impl<T, I: IrqControl> IrqSpinLock<T, I> {
    /// Create a new IRQ-safe spinlock.
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
            _irq: PhantomData,
        }
    }

    /// Acquire the lock with interrupts disabled.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T, I> {
        let irq_state = I::disable();

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }

        IrqSpinLockGuard {
            lock: self,
            irq_state,
        }
    }

    /// Mutable access without locking, for callers that own the lock
    /// exclusively (setup and teardown paths).
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// Guard returned by `IrqSpinLock::lock`.
///
/// Releases the lock, then restores interrupt state on drop.
pub struct IrqSpinLockGuard<'a, T, I: IrqControl> {
    lock: &'a IrqSpinLock<T, I>,
    irq_state: I::State,
}

impl<T, I: IrqControl> core::ops::Deref for IrqSpinLockGuard<'_, T, I> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: the guard proves exclusive ownership of the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, I: IrqControl> core::ops::DerefMut for IrqSpinLockGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: the guard proves exclusive ownership of the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T, I: IrqControl> Drop for IrqSpinLockGuard<'_, T, I> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        I::restore(self.irq_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicIsize;
    use std::thread;

    static MASK_DEPTH: AtomicIsize = AtomicIsize::new(0);

    struct CountingIrq;

    impl IrqControl for CountingIrq {
        type State = ();

        fn disable() {
            MASK_DEPTH.fetch_add(1, Ordering::SeqCst);
        }

        fn restore(_state: ()) {
            MASK_DEPTH.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn masks_for_the_guard_lifetime() {
        let lock: IrqSpinLock<u32, CountingIrq> = IrqSpinLock::new(0);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert_eq!(MASK_DEPTH.load(Ordering::SeqCst), 1);
        }
        assert_eq!(MASK_DEPTH.load(Ordering::SeqCst), 0);
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn serializes_threads() {
        let lock: Arc<IrqSpinLock<u64, crate::sync::irq::NoIrq>> =
            Arc::new(IrqSpinLock::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(*lock.lock(), 40_000);
    }

    #[test]
    fn get_mut_bypasses_the_lock() {
        let mut lock: IrqSpinLock<Vec<u8>, crate::sync::irq::NoIrq> =
            IrqSpinLock::new(Vec::new());
        lock.get_mut().push(7);
        assert_eq!(lock.lock().as_slice(), &[7]);
    }
}
