//! Lifecycle rules shared by records that move through a fixed set of states.

use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move {entity} from '{from}' to '{to}'")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: String,
    pub to: String,
}

pub trait StatusMachine: Copy + PartialEq + Display + 'static {
    /// Human-readable record name used in error messages
    const ENTITY: &'static str;

    /// States reachable in one step from `self`
    fn allowed_next(&self) -> &'static [Self];

    fn can_transition_to(&self, next: Self) -> bool {
        self.allowed_next().contains(&next)
    }

    fn transition_to(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: Self::ENTITY,
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }
}
