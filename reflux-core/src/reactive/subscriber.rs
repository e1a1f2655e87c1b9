//! Subscriber types for the reactive system.
//!
//! A Subscriber is any computation that depends on reactive values: memos and
//! effects. The runtime stores them type-erased so it can re-run a memo of any
//! value type while verifying some other node's dependencies.

use crate::error::ReactiveError;

/// A computation the runtime can re-run.
pub(crate) trait Subscriber {
    /// Run the computation once.
    ///
    /// Returns `Ok(true)` when the observable output changed and dependents
    /// must be dirtied. Memo failures are values and come back as `Ok`; an
    /// `Err` is an effect run that failed.
    fn run(&self) -> Result<bool, ReactiveError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        runs: Cell<usize>,
    }

    impl Subscriber for Counter {
        fn run(&self) -> Result<bool, ReactiveError> {
            self.runs.set(self.runs.get() + 1);
            Ok(self.runs.get() % 2 == 0)
        }
    }

    #[test]
    fn subscribers_run_through_trait_objects() {
        let counter = std::rc::Rc::new(Counter { runs: Cell::new(0) });
        let erased: std::rc::Rc<dyn Subscriber> = counter.clone();

        assert_eq!(erased.run(), Ok(false));
        assert_eq!(erased.run(), Ok(true));
        assert_eq!(counter.runs.get(), 2);
    }
}
