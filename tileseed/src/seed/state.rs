//! Task lifecycle states and operation types.
//!
//! ```text
//! UNSET ──schedule──► READY ──pickup──► RUNNING ──success──► DONE
//!   │                   │                  │
//!   └──── terminate ────┴──────────────────┴──failure/terminate──► DEAD
//! ```
//!
//! `DONE` and `DEAD` are terminal.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::SeedError;

/// Lifecycle state of a task, and the aggregated state of a job.
///
/// Stored as an atomic u8 inside [`Task`](super::Task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TaskState {
    /// Constructed, not yet scheduled.
    Unset = 0,
    /// Scheduled, waiting for a worker.
    Ready = 1,
    /// Executing on a worker.
    Running = 2,
    /// Finished successfully.
    Done = 3,
    /// Failed or terminated.
    Dead = 4,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        Self::Unset,
        Self::Ready,
        Self::Running,
        Self::Done,
        Self::Dead,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unset),
            1 => Some(Self::Ready),
            2 => Some(Self::Running),
            3 => Some(Self::Done),
            4 => Some(Self::Dead),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "UNSET",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Dead => "DEAD",
        }
    }

    /// Numeric code used by legacy status tuples.
    ///
    /// `0` pending, `1` running, `2` done, `-1` dead.
    pub fn state_code(&self) -> i64 {
        match self {
            Self::Unset | Self::Ready => 0,
            Self::Running => 1,
            Self::Done => 2,
            Self::Dead => -1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Dead)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Unset | Self::Ready)
    }

    /// Rank in the job aggregation order; higher dominates.
    fn dominance(&self) -> u8 {
        match self {
            Self::Unset | Self::Ready => 0,
            Self::Done => 1,
            Self::Running => 2,
            Self::Dead => 3,
        }
    }

    /// Aggregates task states into a job state.
    ///
    /// `DEAD` beats `RUNNING`, which beats `DONE`, which beats the pending
    /// states. `UNSET` is reported as `READY`, as is an empty set.
    pub fn aggregate<I>(states: I) -> TaskState
    where
        I: IntoIterator<Item = TaskState>,
    {
        let state = states
            .into_iter()
            .max_by_key(TaskState::dominance)
            .unwrap_or(TaskState::Ready);
        match state {
            Self::Unset => Self::Ready,
            other => other,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation performed by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Render tiles that are not cached yet.
    Seed,
    /// Render every tile, overwriting the cache.
    Reseed,
    /// Delete cached tiles.
    Truncate,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Reseed => "reseed",
            Self::Truncate => "truncate",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = SeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "seed" => Ok(Self::Seed),
            "reseed" => Ok(Self::Reseed),
            "truncate" => Ok(Self::Truncate),
            _ => Err(SeedError::UnsupportedJobType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use TaskState::*;

    #[test]
    fn test_from_u8_round_trip() {
        for state in TaskState::ALL {
            assert_eq!(TaskState::from_u8(state as u8), Some(state));
        }
        assert_eq!(TaskState::from_u8(5), None);
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(Unset.state_code(), 0);
        assert_eq!(Ready.state_code(), 0);
        assert_eq!(Running.state_code(), 1);
        assert_eq!(Done.state_code(), 2);
        assert_eq!(Dead.state_code(), -1);
    }

    #[test]
    fn test_terminal_states() {
        assert!(Done.is_terminal());
        assert!(Dead.is_terminal());
        assert!(!Running.is_terminal());
        assert!(Unset.is_pending() && Ready.is_pending());
    }

    #[test]
    fn test_aggregate_pairs() {
        assert_eq!(TaskState::aggregate([Done, Unset]), Done);
        assert_eq!(TaskState::aggregate([Running, Dead]), Dead);
        assert_eq!(TaskState::aggregate([Ready, Unset]), Ready);
        assert_eq!(TaskState::aggregate([Done, Running]), Running);
        assert_eq!(TaskState::aggregate([Unset]), Ready);
        assert_eq!(TaskState::aggregate([]), Ready);
    }

    #[test]
    fn test_task_type_parse() {
        assert_eq!("SEED".parse::<TaskType>().unwrap(), TaskType::Seed);
        assert_eq!(" reseed ".parse::<TaskType>().unwrap(), TaskType::Reseed);
        assert_eq!("truncate".parse::<TaskType>().unwrap(), TaskType::Truncate);
        assert!(matches!(
            "unset".parse::<TaskType>(),
            Err(SeedError::UnsupportedJobType(t)) if t == "unset"
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Running.to_string(), "RUNNING");
        assert_eq!(TaskType::Reseed.to_string(), "reseed");
    }

    fn any_state() -> impl Strategy<Value = TaskState> {
        prop::sample::select(TaskState::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_aggregate_follows_dominance(states in prop::collection::vec(any_state(), 1..8)) {
            let expected = if states.contains(&Dead) {
                Dead
            } else if states.contains(&Running) {
                Running
            } else if states.contains(&Done) {
                Done
            } else {
                Ready
            };
            prop_assert_eq!(TaskState::aggregate(states.iter().copied()), expected);
        }
    }
}
