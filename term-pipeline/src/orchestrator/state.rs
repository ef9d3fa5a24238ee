//! Stage state machine.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Read every source into the registry
    Extract,
    /// First transformation pass
    PreTransform,
    /// Constraint, foreign-key and composite-key checks
    Validate,
    /// Second transformation pass
    PostTransform,
    /// Statistical profiles
    Profile,
    /// Hand final datasets to the sink
    Load,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Extract,
        Stage::PreTransform,
        Stage::Validate,
        Stage::PostTransform,
        Stage::Profile,
        Stage::Load,
    ];

    /// The state reached once this stage has completed or been skipped.
    pub fn completed_state(&self) -> PipelineState {
        match self {
            Stage::Extract => PipelineState::Extracted,
            Stage::PreTransform => PipelineState::PreTransformed,
            Stage::Validate => PipelineState::Validated,
            Stage::PostTransform => PipelineState::PostTransformed,
            Stage::Profile => PipelineState::Profiled,
            Stage::Load => PipelineState::Loaded,
        }
    }

    /// Returns the string representation of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::PreTransform => "pre_transform",
            Stage::Validate => "validate",
            Stage::PostTransform => "post_transform",
            Stage::Profile => "profile",
            Stage::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run state.
///
/// ```text
/// INIT -> EXTRACTED -> PRE_TRANSFORMED -> VALIDATED -> POST_TRANSFORMED
///      -> PROFILED -> LOADED -> DONE
/// ```
///
/// `FAILED` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    #[default]
    Init,
    Extracted,
    PreTransformed,
    Validated,
    PostTransformed,
    Profiled,
    Loaded,
    Done,
    Failed,
}

impl PipelineState {
    /// The only forward successor of this state.
    pub fn next(&self) -> Option<PipelineState> {
        use PipelineState::*;
        match self {
            Init => Some(Extracted),
            Extracted => Some(PreTransformed),
            PreTransformed => Some(Validated),
            Validated => Some(PostTransformed),
            PostTransformed => Some(Profiled),
            Profiled => Some(Loaded),
            Loaded => Some(Done),
            Done | Failed => None,
        }
    }

    /// Returns true for `DONE` and `FAILED`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Moves to `to`, rejecting anything but the forward successor or `FAILED`.
    pub fn advance(self, to: PipelineState) -> Result<PipelineState> {
        let allowed = match to {
            PipelineState::Failed => !self.is_terminal(),
            _ => self.next() == Some(to),
        };
        if allowed {
            Ok(to)
        } else {
            Err(PipelineError::InvalidState {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        use PipelineState::*;
        match self {
            Init => "INIT",
            Extracted => "EXTRACTED",
            PreTransformed => "PRE_TRANSFORMED",
            Validated => "VALIDATED",
            PostTransformed => "POST_TRANSFORMED",
            Profiled => "PROFILED",
            Loaded => "LOADED",
            Done => "DONE",
            Failed => "FAILED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
