//! Loop history threaded through every controller transition.

use std::collections::BTreeSet;

use crate::boost::sections::ResponseKind;

/// Retry reason for replies with no usable section
pub const REASON_NO_SECTION: &str = "no SUMMARY or GUIDANCE section";

/// Retry reason when the executor answered without calling a tool
pub const REASON_NOT_FOLLOWED: &str = "guidance not followed";

/// Appended to the reason when the planner repeats earlier guidance
pub const REASON_REPEATED: &str = "guidance repeated without progress";

/// One rejected planning attempt
#[derive(Debug, Clone, PartialEq)]
pub struct LoopAttempt {
    /// 0-based iteration this attempt belongs to
    pub iteration: u32,
    pub raw_text: String,
    pub kind: ResponseKind,
    /// Set when the executor was invoked
    pub tools_used: Option<bool>,
    /// Why the attempt was rejected; shown to the planner on the next pass
    pub reason: String,
}

impl LoopAttempt {
    pub fn new(iteration: u32, raw_text: impl Into<String>, kind: ResponseKind, reason: impl Into<String>) -> Self {
        Self {
            iteration,
            raw_text: raw_text.into(),
            kind,
            tools_used: None,
            reason: reason.into(),
        }
    }

    pub fn with_tools_used(mut self, used: bool) -> Self {
        self.tools_used = Some(used);
        self
    }
}

/// Append-only loop history for one request.
///
/// Transitions take `self` by value and return the next state. While the
/// loop is running, `attempts().len() == iteration()`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopState {
    attempts: Vec<LoopAttempt>,
    iteration: u32,
    max_iterations: u32,
    terminal: bool,
    guidance_seen: BTreeSet<String>,
}

impl LoopState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            attempts: Vec::new(),
            iteration: 0,
            max_iterations: max_iterations.max(1),
            terminal: false,
            guidance_seen: BTreeSet::new(),
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn attempts(&self) -> &[LoopAttempt] {
        &self.attempts
    }

    pub fn last_attempt(&self) -> Option<&LoopAttempt> {
        self.attempts.last()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Whether the iteration cap has been reached
    pub fn is_exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    /// Whether the current iteration is the last one allowed
    pub fn is_final_iteration(&self) -> bool {
        self.iteration + 1 >= self.max_iterations
    }

    /// Append an attempt and advance to the next iteration.
    pub fn record(mut self, attempt: LoopAttempt) -> Self {
        debug_assert!(!self.terminal, "recorded attempt on a terminal loop");
        debug_assert_eq!(attempt.iteration, self.iteration);
        self.attempts.push(attempt);
        self.iteration = (self.iteration + 1).min(self.max_iterations);
        self
    }

    /// Remember a guidance text; the flag is false when it was issued before.
    pub fn register_guidance(mut self, guidance: &str) -> (Self, bool) {
        let normalized = guidance.trim().to_string();
        let is_new = self.guidance_seen.insert(normalized);
        (self, is_new)
    }

    /// Mark the loop as finished
    pub fn finish(mut self) -> Self {
        self.terminal = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn other(iteration: u32) -> LoopAttempt {
        LoopAttempt::new(iteration, "???", ResponseKind::Other, REASON_NO_SECTION)
    }

    #[test]
    fn test_new_state() {
        let state = LoopState::new(3);
        assert_eq!(state.iteration(), 0);
        assert!(state.attempts().is_empty());
        assert!(!state.is_exhausted());
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_record_advances_by_one() {
        let state = LoopState::new(3).record(other(0));
        assert_eq!(state.iteration(), 1);
        assert_eq!(state.attempts().len(), 1);

        let state = state.record(other(1));
        assert_eq!(state.iteration(), 2);
        assert_eq!(state.attempts().len(), state.iteration() as usize);
        assert!(state.is_final_iteration());
    }

    #[test]
    fn test_exhausted_at_cap() {
        let state = LoopState::new(2).record(other(0)).record(other(1));
        assert!(state.is_exhausted());
        assert_eq!(state.iteration(), 2);
    }

    #[test]
    fn test_zero_max_is_one() {
        let state = LoopState::new(0);
        assert_eq!(state.max_iterations(), 1);
        assert!(state.is_final_iteration());
    }

    #[test]
    fn test_register_guidance() {
        let (state, first) = LoopState::new(3).register_guidance("call ls");
        assert!(first);
        let (_, again) = state.register_guidance("  call ls \n");
        assert!(!again);
    }

    #[test]
    fn test_attempt_tools_used() {
        let attempt = LoopAttempt::new(0, "GUIDANCE:\nx", ResponseKind::Guidance, REASON_NOT_FOLLOWED)
            .with_tools_used(false);
        assert_eq!(attempt.tools_used, Some(false));
    }

    #[test]
    fn test_finish() {
        let state = LoopState::new(3).finish();
        assert!(state.is_terminal());
    }
}
