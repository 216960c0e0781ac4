//! Event-sourced aggregates: the run lifecycle is rebuilt from its stream.

/// Identity and stream position of an aggregate.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Events applied so far; `0` for a stream that was never written.
    fn version(&self) -> u64;
}

/// Stream position a writer expects to append at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Append wherever the stream currently ends.
    Any,
    /// Append only if the stream holds exactly this many events.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

impl core::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ExpectedVersion::Any => f.write_str("any version"),
            ExpectedVersion::Exact(v) => write!(f, "version {v}"),
        }
    }
}

/// Decide with `handle`, evolve with `apply`.
///
/// `handle` never mutates and `apply` never fails, so replaying a stored
/// stream through `apply` always reproduces the state that produced it.
/// Neither side does IO; the coordinator loads, appends and publishes.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Fold one event into state; bumps the version by one.
    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
