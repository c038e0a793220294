//! Monotonic time source

/// Free-running local microsecond clock
pub trait MonotonicClock {
    /// Microseconds since an arbitrary epoch; never goes backwards
    fn now_us(&self) -> u64;
}

impl<C: MonotonicClock + ?Sized> MonotonicClock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}
