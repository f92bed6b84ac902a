use serde::Serialize;

/// Where the live interview currently is in the listen/think/speak cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Finishing,
    Error,
}

impl TurnState {
    /// Allowed edges of the turn-taking machine.
    pub fn can_transition(self, to: TurnState) -> bool {
        use TurnState::*;
        match (self, to) {
            (_, Finishing) | (_, Error) => true,
            (Idle, Listening) | (Idle, Speaking) => true,
            (Listening, Thinking) | (Listening, Idle) => true,
            (Thinking, Speaking) => true,
            (Speaking, Idle) | (Speaking, Listening) => true,
            (Error, Idle) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::Thinking => "thinking",
            TurnState::Speaking => "speaking",
            TurnState::Finishing => "finishing",
            TurnState::Error => "error",
        }
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TurnState::*;

    #[test]
    fn test_turn_cycle_edges() {
        assert!(Idle.can_transition(Listening));
        assert!(Listening.can_transition(Thinking));
        assert!(Thinking.can_transition(Speaking));
        assert!(Speaking.can_transition(Idle));
        assert!(Speaking.can_transition(Listening));
    }

    #[test]
    fn test_listening_never_jumps_to_speaking() {
        assert!(!Listening.can_transition(Speaking));
        assert!(!Thinking.can_transition(Listening));
        assert!(!Thinking.can_transition(Idle));
    }

    #[test]
    fn test_finishing_and_error_reachable_from_anywhere() {
        for from in [Idle, Listening, Thinking, Speaking, Finishing, Error] {
            assert!(from.can_transition(Finishing));
            assert!(from.can_transition(Error));
        }
        assert!(Error.can_transition(Idle));
        assert!(!Finishing.can_transition(Idle));
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Thinking).unwrap(), "thinking");
        assert_eq!(Speaking.to_string(), "speaking");
    }
}
