//! Time-ordered event identifiers.
//!
//! An [`EventId`] is a version-6 UUID: 60 bits of Gregorian timestamp at
//! 100 ns resolution, a 14-bit counter, and a 48-bit per-process node id.
//! The hyphenated textual form sorts lexicographically in creation-time
//! order, which is what lets the store treat "key order" and "time order"
//! as the same thing, and lets the pruner read an event's age back out of
//! its key without storing a timestamp column.

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::{Timestamp, Uuid};

/// 100 ns intervals between the Gregorian epoch (1582-10-15) and the Unix
/// epoch (1970-01-01), per RFC 9562.
const UUID_TICKS_BETWEEN_EPOCHS: u64 = 0x01B2_1DD2_1381_4000;

/// The counter is the UUID clock sequence: 14 bits.
const MAX_COUNTER: u16 = 0x3FFF;

/// A 16-byte identifier whose lexicographic order equals creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(Uuid);

impl EventId {
    /// Recovers the creation time embedded in the identifier.
    pub fn timestamp(&self) -> SystemTime {
        // Always present for a version 6 UUID, which is the only form the
        // constructors admit.
        match self.0.get_timestamp() {
            Some(ts) => {
                let (secs, nanos) = ts.to_unix();
                UNIX_EPOCH + Duration::new(secs, nanos)
            }
            None => UNIX_EPOCH,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Canonical 36-character hyphenated lowercase form.
        write!(f, "{}", self.0)
    }
}

/// Errors from parsing an [`EventId`] out of its textual form.
#[derive(Debug, Error)]
pub enum ParseEventIdError {
    /// The string is not a UUID at all.
    #[error("'{0}' is not a valid event id")]
    Malformed(String),

    /// The string is a UUID but not a time-ordered one.
    #[error("'{0}' is not a time-ordered (version 6) event id")]
    WrongVersion(String),
}

impl FromStr for EventId {
    type Err = ParseEventIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::try_parse(s).map_err(|_| ParseEventIdError::Malformed(s.to_string()))?;
        if uuid.get_version_num() != 6 {
            return Err(ParseEventIdError::WrongVersion(s.to_string()));
        }
        Ok(EventId(uuid))
    }
}

/// Errors from the identifier generator.
#[derive(Debug, Error)]
pub enum IdError {
    /// The OS entropy source failed while drawing the node id.
    #[error("entropy source failed: {0}")]
    Entropy(#[from] rand::Error),

    /// The system clock reads before the Unix epoch.
    #[error("system clock is before the unix epoch")]
    Clock,
}

/// Mints strictly increasing [`EventId`]s for one process.
///
/// The generator keeps the last issued `(ticks, counter)` pair under a
/// mutex. A clock reading that repeats or regresses reuses the last tick
/// and bumps the counter; counter exhaustion advances the tick by one.
/// Either way every issued id compares strictly greater than the one
/// before it, both as a value and as a rendered key.
pub struct EventIdGenerator {
    node_id: [u8; 6],
    last: Mutex<(u64, u16)>,
}

impl EventIdGenerator {
    /// Creates a generator with a random node id.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Entropy` if the OS random source fails.
    pub fn new() -> Result<Self, IdError> {
        let mut node_id = [0u8; 6];
        OsRng.try_fill_bytes(&mut node_id)?;
        // Multicast bit marks the node id as random rather than a MAC.
        node_id[0] |= 0x01;

        Ok(Self {
            node_id,
            last: Mutex::new((0, 0)),
        })
    }

    /// Mints the next identifier.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Clock` if the system clock reads before the Unix
    /// epoch.
    pub fn next(&self) -> Result<EventId, IdError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| IdError::Clock)?;
        let ticks = UUID_TICKS_BETWEEN_EPOCHS
            + now.as_secs() * 10_000_000
            + u64::from(now.subsec_nanos()) / 100;

        let mut last = self.last.lock();
        let (mut t, mut c) = *last;
        if ticks > t {
            t = ticks;
            c = 0;
        } else if c < MAX_COUNTER {
            c += 1;
        } else {
            t += 1;
            c = 0;
        }
        *last = (t, c);
        drop(last);

        let ts = Timestamp::from_gregorian(t, c);
        Ok(EventId(Uuid::new_v6(ts, &self.node_id)))
    }
}
