use std::fmt;

/// State of a [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventState {
    #[default]
    NotReady,
    Ready,
    Error,
}

impl EventState {
    /// Returns true for `Ready` and `Error`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventState::NotReady)
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventState::NotReady => write!(f, "not_ready"),
            EventState::Ready => write!(f, "ready"),
            EventState::Error => write!(f, "error"),
        }
    }
}

/// Completion signal for one execution of a primitive.
///
/// The caller creates a fresh event right before `Primitive::execute`, and the
/// primitive writes its outcome into it. The event holds no synchronization of
/// its own; whoever polls it from another thread wraps it accordingly.
///
/// Once `Ready` or `Error`, the state never changes again.
#[derive(Debug, Default)]
pub struct Event {
    state: EventState,
}

impl Event {
    pub fn new() -> Self {
        Event {
            state: EventState::NotReady,
        }
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    /// Transition to `state`.
    ///
    /// A second terminal transition is a usage error: it is logged and
    /// ignored, leaving the first outcome in place.
    pub fn set_state(&mut self, state: EventState) {
        if self.state.is_terminal() {
            tracing::warn!(
                current = %self.state,
                requested = %state,
                "event already completed; ignoring state change"
            );
            return;
        }
        self.state = state;
    }

    pub fn is_ready(&self) -> bool {
        self.state == EventState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_not_ready() {
        let e = Event::new();
        assert_eq!(e.state(), EventState::NotReady);
        assert!(!e.is_ready());
    }

    #[test]
    fn test_ready_is_sticky() {
        let mut e = Event::new();
        e.set_state(EventState::Ready);
        assert_eq!(e.state(), EventState::Ready);
        e.set_state(EventState::Error);
        assert_eq!(e.state(), EventState::Ready);
        e.set_state(EventState::NotReady);
        assert_eq!(e.state(), EventState::Ready);
        // polling has no side effects
        for _ in 0..3 {
            assert!(e.is_ready());
        }
    }

    #[test]
    fn test_error_is_sticky() {
        let mut e = Event::new();
        e.set_state(EventState::Error);
        e.set_state(EventState::Ready);
        assert_eq!(e.state(), EventState::Error);
    }

    #[test]
    fn test_not_ready_to_not_ready() {
        let mut e = Event::new();
        e.set_state(EventState::NotReady);
        assert_eq!(e.state(), EventState::NotReady);
        e.set_state(EventState::Ready);
        assert_eq!(e.state(), EventState::Ready);
    }
}
