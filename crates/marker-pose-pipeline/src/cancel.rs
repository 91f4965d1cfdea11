use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Loop termination check, polled once at the start of every iteration.
///
/// Implementations must not block.
pub trait CancelSource {
    fn poll_cancel(&mut self) -> bool;
}

impl<T: CancelSource + ?Sized> CancelSource for &mut T {
    fn poll_cancel(&mut self) -> bool {
        (**self).poll_cancel()
    }
}

impl<T: CancelSource + ?Sized> CancelSource for Box<T> {
    fn poll_cancel(&mut self) -> bool {
        (**self).poll_cancel()
    }
}

/// Never requests a stop; the session ends with the stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelSource for NeverCancel {
    fn poll_cancel(&mut self) -> bool {
        false
    }
}

/// Allows a fixed number of iterations, then requests a stop.
#[derive(Clone, Copy, Debug)]
pub struct FrameBudget {
    remaining: u64,
}

impl FrameBudget {
    pub fn new(iterations: u64) -> Self {
        Self {
            remaining: iterations,
        }
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl CancelSource for FrameBudget {
    fn poll_cancel(&mut self) -> bool {
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        false
    }
}

/// Shared stop flag; clone it into another thread or a renderer and call
/// [`CancelFlag::cancel`].
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl CancelSource for CancelFlag {
    fn poll_cancel(&mut self) -> bool {
        self.is_cancelled()
    }
}
