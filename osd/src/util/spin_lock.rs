//! Non-blocking locks for sharing state between thread code and interrupt
//! handlers.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// Protects a `T` against concurrent or reentrant access.
///
/// Locking never blocks: it either succeeds immediately or reports contention.
/// An interrupt handler that finds the lock held cannot wait for the code it
/// preempted to release it, so contention there is a bug (see
/// `driver::acquire_hw`), while thread code can simply try again later.
#[derive(Debug)]
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    contents: UnsafeCell<T>,
}

unsafe impl<T: Send + ?Sized> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(contents: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            contents: UnsafeCell::new(contents),
        }
    }

    /// Address of the protected value, for handing to a DMA controller.
    ///
    /// Dereferencing the pointer is subject to the same rules as any other
    /// access: only do it while holding the lock, or from hardware that the
    /// lock holder has arranged not to be running.
    pub fn as_ptr(&self) -> *mut T {
        self.contents.get()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpinLockError {
    Contended,
}

impl<T: ?Sized + Send> SpinLock<T> {
    pub fn try_lock(&self) -> Result<SpinLockGuard<T>, SpinLockError> {
        if self.locked.swap(true, Ordering::Acquire) {
            Err(SpinLockError::Contended)
        } else {
            // We observed the false->true transition, so nobody else holds a
            // reference until the guard drops.
            Ok(SpinLockGuard {
                locked: LockBorrow(&self.locked),
                // Safety: locked above.
                contents: unsafe { &mut *self.contents.get() },
            })
        }
    }

    /// Runs `body` with the contents if the lock is free.
    pub fn try_with<R>(
        &self,
        body: impl FnOnce(&mut T) -> R,
    ) -> Result<R, SpinLockError> {
        let mut guard = self.try_lock()?;
        Ok(body(&mut guard))
    }
}

#[must_use = "if dropped, the spinlock will immediately unlock"]
#[derive(Debug)]
pub struct SpinLockGuard<'a, T: ?Sized> {
    locked: LockBorrow<'a>,
    contents: &'a mut T,
}

/// Releases the lock flag when dropped. Kept apart from `SpinLockGuard` so
/// that guards can be taken apart and rebuilt by `map`.
#[derive(Debug)]
struct LockBorrow<'a>(&'a AtomicBool);

impl<'a, T: ?Sized> SpinLockGuard<'a, T> {
    /// Narrows a guard of `T` to a guard of some part of `T`.
    pub fn map<U: ?Sized>(
        orig: SpinLockGuard<'a, T>,
        f: impl FnOnce(&mut T) -> &mut U,
    ) -> SpinLockGuard<'a, U> {
        let SpinLockGuard { locked, contents } = orig;
        SpinLockGuard {
            locked,
            contents: f(contents),
        }
    }
}

impl<'a, T: ?Sized> core::ops::Deref for SpinLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.contents
    }
}

impl<'a, T: ?Sized> core::ops::DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.contents
    }
}

impl<'a> Drop for LockBorrow<'a> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_is_contended() {
        let l = SpinLock::new(5);
        let g = l.try_lock().unwrap();
        assert_eq!(l.try_lock().err(), Some(SpinLockError::Contended));
        drop(g);
        assert_eq!(*l.try_lock().unwrap(), 5);
    }

    #[test]
    fn map_keeps_lock() {
        let l = SpinLock::new(Some(3));
        {
            let mut g = SpinLockGuard::map(l.try_lock().unwrap(), |o| {
                o.as_mut().unwrap()
            });
            *g += 1;
            assert!(l.try_lock().is_err());
        }
        assert_eq!(l.try_with(|o| *o), Ok(Some(4)));
    }

    #[test]
    fn pointer_is_stable() {
        let l = SpinLock::new([0u16; 4]);
        let p = l.as_ptr();
        l.try_with(|a| a[2] = 7).unwrap();
        assert_eq!(unsafe { (*p)[2] }, 7);
        assert_eq!(l.as_ptr(), p);
    }
}
