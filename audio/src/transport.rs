//! Transport state machine
//!
//! ```text
//!            play()                 resume acknowledged
//! Stopped ───────────► Starting ─────────────────────► Running
//!    ▲                    │                               │
//!    └──── stop() ────────┴────────── stop() ─────────────┘
//! ```
//!
//! The state lives in a single atomic so `stop()` on the control thread can
//! race the acknowledgment coming from the device callback. Underruns never
//! change the state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Playback lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    /// Source halted, device suspended (initial)
    Stopped = 0,
    /// Source started and device resume requested, not yet confirmed
    Starting = 1,
    /// Device confirmed it is pulling audio
    Running = 2,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
        }
    }
}

/// Control side of the transport, owned by whoever starts and stops playback
#[derive(Debug)]
pub struct Transport {
    state: Arc<AtomicU8>,
}

impl Transport {
    /// New transport in [`TransportState::Stopped`]
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(TransportState::Stopped as u8)),
        }
    }

    /// Current state
    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True only between a resume acknowledgment and the next stop
    pub fn is_running(&self) -> bool {
        self.state() == TransportState::Running
    }

    /// Request playback
    ///
    /// Returns `true` if this call moved `Stopped → Starting`, in which case
    /// the caller must start the source and request a device resume. In
    /// `Starting` or `Running` this is a no-op returning `false`.
    pub fn play(&self) -> bool {
        self.state
            .compare_exchange(
                TransportState::Stopped as u8,
                TransportState::Starting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Stopped` from any state, returning the previous state
    pub fn stop(&self) -> TransportState {
        TransportState::from_u8(
            self.state
                .swap(TransportState::Stopped as u8, Ordering::AcqRel),
        )
    }

    /// Handle for the device side to acknowledge resumes
    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            state: self.state.clone(),
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

/// Device side of the transport
///
/// Can only observe the state and promote `Starting → Running`.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    state: Arc<AtomicU8>,
}

impl TransportHandle {
    /// Acknowledge that the device resumed
    ///
    /// Only takes effect in `Starting`; an acknowledgment that arrives after
    /// a `stop()` is ignored. Returns whether the state changed.
    #[inline]
    pub fn acknowledge_resume(&self) -> bool {
        // Plain load first so the steady state costs no read-modify-write
        if self.state.load(Ordering::Relaxed) != TransportState::Starting as u8 {
            return false;
        }
        self.state
            .compare_exchange(
                TransportState::Starting as u8,
                TransportState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Current state
    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }
}
