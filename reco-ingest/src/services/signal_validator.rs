//! Signal format validation
//!
//! A signal is the lookup key of a recommendation list, usually several entity
//! ids joined by the model's concatenator (`articleId_userId`). Only the number
//! of parts is checked; part contents are free-form.
//!
//! [`SignalFormat`] borrows the model's rule and holds no state, so one value
//! can be shared freely between concurrent readers.

/// Structural rule for one model's signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalFormat<'a> {
    concatenator: &'a str,
    arity: usize,
}

impl<'a> SignalFormat<'a> {
    pub fn new(concatenator: &'a str, arity: usize) -> Self {
        Self { concatenator, arity }
    }

    /// Single-field models accept any signal, so there is nothing to check
    pub fn requires_validation(&self) -> bool {
        !self.concatenator.is_empty()
    }

    pub fn matches(&self, signal: &str) -> bool {
        signal_matches_arity(signal, self.concatenator, self.arity)
    }

    /// Reason recorded against a rejected line
    pub fn mismatch_message(&self, signal: &str) -> String {
        format!(
            "signal '{}' does not match format: expected {} parts joined by '{}'",
            signal, self.arity, self.concatenator
        )
    }
}

/// Whether `signal` splits on `concatenator` into exactly `arity` parts.
///
/// An empty concatenator means the whole signal is one part.
pub fn signal_matches_arity(signal: &str, concatenator: &str, arity: usize) -> bool {
    if concatenator.is_empty() {
        return arity == 1;
    }
    signal.split(concatenator).count() == arity
}
