//! Subplanning operation state machine
//!
//! - States are explicit and enumerable
//! - Transitions are driven by the operation, never inferred
//! - Any non-terminal state may fail
//! - `Assembled` and `Failed` are terminal
//!
//! ```text
//! Initialized -> PerBranchTrialing -> BranchesSelected -> SolutionBuilt
//!             -> Compiled -> Assembled
//! ```

use super::errors::{SubplanError, SubplanResult};

/// Lifecycle of one subplanning operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubplanState {
    /// Query accepted, nothing run yet
    Initialized,

    /// Trialing branches in disjunction order
    PerBranchTrialing {
        branches: usize,
        /// Branches with a winner so far
        selected: usize,
    },

    /// Every branch has a winner
    BranchesSelected { branches: usize },

    /// Composite solution exists
    SolutionBuilt,

    /// Composite compiled into a cache entry
    Compiled,

    /// Execution handle handed to the caller
    Assembled,

    /// Unrecoverable error
    Failed { code: &'static str },
}

impl Default for SubplanState {
    fn default() -> Self {
        Self::new()
    }
}

impl SubplanState {
    pub fn new() -> Self {
        Self::Initialized
    }

    /// State name for observability
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::PerBranchTrialing { .. } => "PerBranchTrialing",
            Self::BranchesSelected { .. } => "BranchesSelected",
            Self::SolutionBuilt => "SolutionBuilt",
            Self::Compiled => "Compiled",
            Self::Assembled => "Assembled",
            Self::Failed { .. } => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Assembled | Self::Failed { .. })
    }

    fn forbidden(&self, to: &'static str) -> SubplanError {
        SubplanError::InvalidTransition {
            from: self.state_name(),
            to,
        }
    }

    /// Initialized → PerBranchTrialing
    pub fn begin_trials(self, branches: usize) -> SubplanResult<Self> {
        match self {
            Self::Initialized if branches > 0 => Ok(Self::PerBranchTrialing {
                branches,
                selected: 0,
            }),
            _ => Err(self.forbidden("PerBranchTrialing")),
        }
    }

    /// PerBranchTrialing → PerBranchTrialing, one more branch has a winner
    pub fn branch_selected(self) -> SubplanResult<Self> {
        match self {
            Self::PerBranchTrialing { branches, selected } if selected < branches => {
                Ok(Self::PerBranchTrialing {
                    branches,
                    selected: selected + 1,
                })
            }
            _ => Err(self.forbidden("PerBranchTrialing")),
        }
    }

    /// PerBranchTrialing → BranchesSelected, once every branch has a winner
    pub fn finish_selection(self) -> SubplanResult<Self> {
        match self {
            Self::PerBranchTrialing { branches, selected } if selected == branches => {
                Ok(Self::BranchesSelected { branches })
            }
            _ => Err(self.forbidden("BranchesSelected")),
        }
    }

    /// BranchesSelected → SolutionBuilt
    pub fn solution_built(self) -> SubplanResult<Self> {
        match self {
            Self::BranchesSelected { .. } => Ok(Self::SolutionBuilt),
            _ => Err(self.forbidden("SolutionBuilt")),
        }
    }

    /// SolutionBuilt → Compiled
    pub fn compiled(self) -> SubplanResult<Self> {
        match self {
            Self::SolutionBuilt => Ok(Self::Compiled),
            _ => Err(self.forbidden("Compiled")),
        }
    }

    /// Compiled → Assembled
    pub fn assembled(self) -> SubplanResult<Self> {
        match self {
            Self::Compiled => Ok(Self::Assembled),
            _ => Err(self.forbidden("Assembled")),
        }
    }

    /// Any non-terminal state → Failed
    pub fn fail(self, code: &'static str) -> SubplanResult<Self> {
        if self.is_terminal() {
            return Err(self.forbidden("Failed"));
        }
        Ok(Self::Failed { code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let state = SubplanState::new()
            .begin_trials(2)
            .and_then(SubplanState::branch_selected)
            .and_then(SubplanState::branch_selected)
            .and_then(SubplanState::finish_selection)
            .unwrap();
        assert_eq!(state, SubplanState::BranchesSelected { branches: 2 });

        let state = state
            .solution_built()
            .and_then(SubplanState::compiled)
            .and_then(SubplanState::assembled)
            .unwrap();
        assert_eq!(state, SubplanState::Assembled);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_selection_requires_every_branch() {
        let state = SubplanState::new()
            .begin_trials(2)
            .and_then(SubplanState::branch_selected)
            .unwrap();
        let err = state.finish_selection().unwrap_err();
        assert_eq!(
            err,
            SubplanError::InvalidTransition {
                from: "PerBranchTrialing",
                to: "BranchesSelected"
            }
        );
    }

    #[test]
    fn test_too_many_branch_winners() {
        let state = SubplanState::new()
            .begin_trials(1)
            .and_then(SubplanState::branch_selected)
            .unwrap();
        assert!(state.branch_selected().is_err());
    }

    #[test]
    fn test_zero_branches_rejected() {
        assert!(SubplanState::new().begin_trials(0).is_err());
    }

    #[test]
    fn test_cannot_skip_compilation() {
        let err = SubplanState::SolutionBuilt.assembled().unwrap_err();
        assert_eq!(err.code(), "SUBPLAN_INVALID_TRANSITION");
    }

    #[test]
    fn test_fail_from_any_non_terminal() {
        for state in [
            SubplanState::Initialized,
            SubplanState::PerBranchTrialing {
                branches: 2,
                selected: 1,
            },
            SubplanState::SolutionBuilt,
            SubplanState::Compiled,
        ] {
            let failed = state.fail("SUBPLAN_INTERRUPTED").unwrap();
            assert_eq!(failed.state_name(), "Failed");
        }
    }

    #[test]
    fn test_terminal_states_cannot_fail() {
        assert!(SubplanState::Assembled.fail("X").is_err());
        assert!(SubplanState::Failed { code: "X" }.fail("Y").is_err());
    }
}
