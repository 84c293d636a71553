//! Small internal helpers shared by the object model and the dispatch
//! runtime: the `log!` diagnostics macro and a spin-wait backoff used by
//! the swarm's lock-free prepend and by `WeakRef::upgrade`'s CAS retry
//! loop.

use std::hint;

/// Colorized, tagged diagnostic print, compiled out entirely unless the
/// `verbose` feature is enabled. `$p` names the emitting component (a
/// module path literal), `$c` a `term_painter::Color`, `$tag` a short
/// event tag, and the rest a format string + arguments.
#[macro_export]
macro_rules! log {
    ($p:ident, $c:ident, $tag:expr, $msg:expr $(, $($args:tt)*)?) => {
        #[cfg(feature = "verbose")]
        {
            use term_painter::Color::*;
            use term_painter::ToStyle;
            println!(
                "{:<14} {}",
                concat!(stringify!($p), ":"),
                $c.paint(format!(concat!("{:>24}  ", $msg), $tag $(, $($args)*)?))
            );
        }
    };
}

/// Exponential-ish spin backoff for short, expected-to-be-brief contention
/// (the growable swarm's CAS prepend, `WeakRef::upgrade`'s CAS loop). Not a
/// general-purpose parking primitive — callers that might wait a long time
/// use `std::sync::Condvar` instead (see `dispatch::thread_pool`).
pub struct Backoff {
    step: u32,
}

impl Backoff {
    pub const fn new() -> Self {
        Backoff { step: 0 }
    }

    pub fn spin(&mut self) {
        let iterations = 1u32 << self.step.min(6);
        for _ in 0..iterations {
            hint::spin_loop();
        }
        if self.step < 6 {
            self.step += 1;
        } else {
            std::thread::yield_now();
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
