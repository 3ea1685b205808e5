// Copyright 2020 Joyent, Inc.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use derive_more::{Add, AddAssign, Display, From, Into, Sub, SubAssign};
use parking_lot::{Condvar, Mutex};
use slog::{warn, Logger};

use crate::config::{ManagerConfig, Setting};
use crate::error::Error;

/// The number of full rounds over the server list a `get_connection` call
/// may make.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tries {
    /// At most this many rounds. Always at least one.
    Bounded(u32),
    /// Keep going until a server answers.
    Unbounded,
}

impl Tries {
    /// Configured values of zero or less mean unbounded.
    pub fn from_setting(tries: i64) -> Self {
        if tries <= 0 {
            Tries::Unbounded
        } else if tries > i64::from(u32::MAX) {
            Tries::Bounded(u32::MAX)
        } else {
            Tries::Bounded(tries as u32)
        }
    }

    /// Whether the zero-based round `round` may run.
    pub fn permits(self, round: u64) -> bool {
        match self {
            Tries::Bounded(n) => round < u64::from(n),
            Tries::Unbounded => true,
        }
    }
}

impl fmt::Display for Tries {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Tries::Bounded(n) => write!(fmt, "{}", n),
            Tries::Unbounded => fmt.write_str("unbounded"),
        }
    }
}

/// Retry and timeout parameters of a manager, normalized from a
/// `ManagerConfig`. Every duration is non-negative; zero timeouts mean no
/// timeout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryOptions {
    pub tries: Tries,
    pub sleep_time: Duration,
    pub so_timeout: Duration,
    pub con_timeout: Duration,
}

impl RetryOptions {
    /// Normalize the numeric settings of `config`. `tries` and `sleep_time`
    /// are required; the timeouts fall back to zero when absent or not
    /// numeric.
    pub fn from_config(
        config: &ManagerConfig,
        log: &Logger,
    ) -> Result<Self, Error> {
        let tries = required(config.tries.as_ref(), "tries")?;
        let sleep_time = required(config.sleep_time.as_ref(), "sleep_time")?;

        Ok(RetryOptions {
            tries: Tries::from_setting(tries),
            sleep_time: millis(sleep_time),
            so_timeout: optional(config.so_timeout.as_ref(), "so_timeout", log),
            con_timeout: optional(
                config.con_timeout.as_ref(),
                "con_timeout",
                log,
            ),
        })
    }
}

fn required(setting: Option<&Setting>, name: &str) -> Result<i64, Error> {
    match setting {
        Some(s) => s.as_i64().ok_or_else(|| {
            Error::Configuration(format!("{} is not a number: {:?}", name, s))
        }),
        None => Err(Error::Configuration(format!("{} is required", name))),
    }
}

fn optional(setting: Option<&Setting>, name: &str, log: &Logger) -> Duration {
    match setting {
        Some(s) => match s.as_i64() {
            Some(v) => millis(v),
            None => {
                warn!(log, "Ignoring non-numeric {}: {:?}, using 0", name, s);
                Duration::from_millis(0)
            }
        },
        None => Duration::from_millis(0),
    }
}

// Negative values clamp to zero.
fn millis(v: i64) -> Duration {
    Duration::from_millis(v.max(0) as u64)
}

/// A newtype wrapper around u64 used for counts of connections.
#[derive(
    Add,
    AddAssign,
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    Eq,
    From,
    Into,
    Ord,
    PartialOrd,
    PartialEq,
    Sub,
    SubAssign,
)]
pub struct ConnectionCount(u64);

/// A snapshot of the activity of a manager since it was created.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ManagerStats {
    /// Retry rounds started by `get_connection`
    pub rounds: u64,
    /// Servers tried across all rounds
    pub attempts: u64,
    /// Attempts that did not produce a connection
    pub failed_attempts: u64,
    /// Sleeps between rounds
    pub sleeps: u64,
    /// Sleeps cut short by `interrupt`
    pub interrupted_sleeps: u64,
    /// Connections opened by the factory
    pub created_connections: ConnectionCount,
    /// Pooled connections handed out again
    pub reused_connections: ConnectionCount,
    /// Pooled connections dropped after failing the health check
    pub discarded_connections: ConnectionCount,
    /// Connections handed back through `give_connection`
    pub released_connections: ConnectionCount,
    /// Connections disconnected by the manager
    pub closed_connections: ConnectionCount,
    /// Disconnects that returned an error
    pub close_failures: ConnectionCount,
    /// Connections currently idle in the pool
    pub idle_connections: ConnectionCount,
}

// The live counters behind `ManagerStats`.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) rounds: AtomicU64,
    pub(crate) attempts: AtomicU64,
    pub(crate) failed_attempts: AtomicU64,
    pub(crate) sleeps: AtomicU64,
    pub(crate) interrupted_sleeps: AtomicU64,
    pub(crate) created: AtomicU64,
    pub(crate) reused: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) released: AtomicU64,
    pub(crate) closed: AtomicU64,
    pub(crate) close_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ManagerStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ManagerStats {
            rounds: get(&self.rounds),
            attempts: get(&self.attempts),
            failed_attempts: get(&self.failed_attempts),
            sleeps: get(&self.sleeps),
            interrupted_sleeps: get(&self.interrupted_sleeps),
            created_connections: get(&self.created).into(),
            reused_connections: get(&self.reused).into(),
            discarded_connections: get(&self.discarded).into(),
            released_connections: get(&self.released).into(),
            closed_connections: get(&self.closed).into(),
            close_failures: get(&self.close_failures).into(),
            idle_connections: ConnectionCount::default(),
        }
    }
}

/// How a sleep between rounds ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum SleepOutcome {
    Elapsed,
    Interrupted,
}

// An interruptible sleep. Sleepers wait on the condvar until their deadline
// passes or the generation counter moves.
#[derive(Debug, Default)]
pub(crate) struct RoundDelay {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl RoundDelay {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sleep(&self, duration: Duration) -> SleepOutcome {
        if duration == Duration::from_millis(0) {
            return SleepOutcome::Elapsed;
        }

        let deadline = Instant::now() + duration;
        let mut generation = self.generation.lock();
        let start = *generation;
        while *generation == start {
            if self
                .condvar
                .wait_until(&mut generation, deadline)
                .timed_out()
            {
                return SleepOutcome::Elapsed;
            }
        }
        SleepOutcome::Interrupted
    }

    pub(crate) fn interrupt(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
    }
}
