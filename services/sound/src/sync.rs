//! Writer/interrupt synchronization
//!
//! [`IrqLock`] is a spin lock that also masks local interrupts, so the
//! device's interrupt handler can never spin on a lock held by code it
//! interrupted. [`WaitQueue`] is the blocking side: writers park on it and
//! the interrupt handler wakes them.

use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

/// Local interrupt masking
pub trait InterruptControl {
    /// Masks interrupts on the current core, returning whether they were
    /// enabled before.
    fn disable_interrupts(&self) -> bool;

    /// Restores the state returned by [`disable_interrupts`].
    ///
    /// [`disable_interrupts`]: InterruptControl::disable_interrupts
    fn restore_interrupts(&self, were_enabled: bool);
}

/// Condition-variable style wait queue.
///
/// A waiter calls [`prepare_to_wait`] while still holding the lock that
/// protects the condition, releases the lock, then calls [`wait`]. A
/// [`wake_all`] issued anywhere after `prepare_to_wait` releases that
/// waiter, so no wakeup is lost between unlock and block. Spurious wakes are
/// allowed; callers re-check their condition.
///
/// [`prepare_to_wait`]: WaitQueue::prepare_to_wait
/// [`wait`]: WaitQueue::wait
/// [`wake_all`]: WaitQueue::wake_all
pub trait WaitQueue: Send + Sync {
    /// Registration token handed from `prepare_to_wait` to `wait`
    type Ticket;

    /// Registers the caller as a waiter.
    fn prepare_to_wait(&self) -> Self::Ticket;

    /// Blocks until a wake issued after the ticket was taken. No timeout.
    fn wait(&self, ticket: Self::Ticket, reason: &'static str);

    /// Wakes every registered waiter.
    fn wake_all(&self);

    /// True if nobody is registered.
    fn is_empty(&self) -> bool;
}

/// Spin lock taken with local interrupts masked
pub struct IrqLock<T> {
    inner: Mutex<T>,
}

impl<T> IrqLock<T> {
    /// Creates a new lock
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Masks interrupts through `irq`, then takes the lock.
    pub fn lock<'a, I: InterruptControl + ?Sized>(&'a self, irq: &'a I) -> IrqLockGuard<'a, T, I> {
        let were_enabled = irq.disable_interrupts();
        IrqLockGuard {
            guard: Some(self.inner.lock()),
            irq,
            were_enabled,
        }
    }
}

/// Guard returned by [`IrqLock::lock`]
pub struct IrqLockGuard<'a, T, I: InterruptControl + ?Sized> {
    guard: Option<MutexGuard<'a, T>>,
    irq: &'a I,
    were_enabled: bool,
}

impl<T, I: InterruptControl + ?Sized> Deref for IrqLockGuard<'_, T, I> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.guard {
            Some(guard) => &**guard,
            None => unreachable!("guard released before drop"),
        }
    }
}

impl<T, I: InterruptControl + ?Sized> DerefMut for IrqLockGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.guard {
            Some(guard) => &mut **guard,
            None => unreachable!("guard released before drop"),
        }
    }
}

impl<T, I: InterruptControl + ?Sized> Drop for IrqLockGuard<'_, T, I> {
    fn drop(&mut self) {
        // Unlock before interrupts come back on.
        drop(self.guard.take());
        self.irq.restore_interrupts(self.were_enabled);
    }
}
