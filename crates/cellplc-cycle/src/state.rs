//! Generic state-triple scaffolding (§3 "State triple", §9 "State machine
//! as data"): every sub-machine in the production cycle is a state enum
//! plus the timestamp of its last transition. `transition` logs the old
//! state, new state, and elapsed time, and is a no-op when the state does
//! not actually change.

use std::time::Instant;

#[derive(Debug)]
pub struct StateTriple<S> {
    pub state: S,
    pub since: Instant,
}

impl<S> StateTriple<S>
where
    S: Copy + PartialEq + Eq + std::fmt::Debug,
{
    pub fn new(initial: S) -> Self {
        StateTriple { state: initial, since: Instant::now() }
    }

    pub fn is(&self, state: S) -> bool {
        self.state == state
    }

    pub fn is_any(&self, states: &[S]) -> bool {
        states.contains(&self.state)
    }

    /// Move to `next`, logging the transition. A same-state "transition" is
    /// silently ignored -- it is not a real transition and must not reset
    /// `since` or spam the log.
    pub fn transition(&mut self, machine: &str, next: S) {
        if self.state == next {
            return;
        }
        let elapsed = self.since.elapsed();
        tracing::debug!(machine, from = ?self.state, to = ?next, elapsed_ms = elapsed.as_millis() as u64, "state transition");
        self.state = next;
        self.since = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Toy {
        A,
        B,
    }

    #[test]
    fn same_state_transition_is_a_no_op() {
        let mut triple = StateTriple::new(Toy::A);
        let since = triple.since;
        triple.transition("toy", Toy::A);
        assert_eq!(triple.since, since);
    }

    #[test]
    fn real_transition_updates_since() {
        let mut triple = StateTriple::new(Toy::A);
        triple.transition("toy", Toy::B);
        assert!(triple.is(Toy::B));
    }
}
