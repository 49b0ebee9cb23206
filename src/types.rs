use serde::{Deserialize, Serialize};
use std::{
    fmt,
    time::{Duration, Instant},
};

/// Belt operating mode as reported in status frames
///
/// The pad drops into [`Self::Standby`] automatically after a period of
/// inactivity and ignores belt commands until it is re-armed with a mode
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PadMode {
    /// Belt speed follows the walker automatically
    Auto = 0,
    /// Belt speed is controlled manually
    Manual = 1,
    /// Power-saving state that ignores belt commands
    Standby = 2,
    /// Unrecognized mode byte
    Unknown = 3,
}

impl From<u8> for PadMode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Auto,
            1 => Self::Manual,
            2 => Self::Standby,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Manual => write!(f, "Manual"),
            Self::Standby => write!(f, "Standby"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Connection lifecycle state tracked by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link; the supervisor will retry discovery
    Disconnected,
    /// Scanning for candidate devices
    Scanning,
    /// Connecting to a discovered candidate
    Connecting,
    /// Link and command channel exist, no telemetry yet
    Connected,
    /// First status reading observed; fully operational
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Scanning => write!(f, "scanning"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// A decoded status telemetry snapshot
///
/// Produced for every notification frame carrying the status signature.
/// Overwrites the previous reading; no history is retained by this layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReading {
    /// Belt speed in km/h, one decimal of precision
    pub speed: f64,
    /// Belt operating mode
    pub mode: PadMode,
    /// Elapsed time reported by the pad
    pub elapsed: Duration,
    /// Distance walked in kilometers
    pub distance_km: f64,
    /// Step count
    pub steps: u32,
    /// When this reading was captured
    pub observed_at: Instant,
}

/// Accumulated session statistics handed to the UI boundary
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionSnapshot {
    /// Whether the belt is considered started
    pub started: bool,
    /// Current belt speed in km/h
    pub speed: f64,
    /// Total accumulated walking time
    pub time_total: Duration,
    /// Total accumulated steps
    pub steps_total: u64,
    /// Total accumulated distance in kilometers
    pub km_total: f64,
}

/// High-level intents issued by the UI collaborator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    /// Start the belt and bring it to the target speed
    Start,
    /// Stop the belt
    Stop,
    /// Change the belt speed in km/h, valid range [0, 6]
    ChangeSpeed(f64),
    /// Shut the supervisor down, disconnecting any active session
    Quit,
}

/// Device discovery parameters
#[derive(Debug, Clone)]
pub struct ScanParams {
    /// How long to scan before giving up
    pub timeout: Duration,
    /// Stop early and prefer this device address when seen
    pub preferred_device: Option<String>,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            preferred_device: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_mode_from_u8() {
        assert_eq!(PadMode::from(0), PadMode::Auto);
        assert_eq!(PadMode::from(1), PadMode::Manual);
        assert_eq!(PadMode::from(2), PadMode::Standby);
        assert_eq!(PadMode::from(99), PadMode::Unknown);
    }

    #[test]
    fn test_pad_mode_display() {
        assert_eq!(PadMode::Standby.to_string(), "Standby");
        assert_eq!(PadMode::Manual.to_string(), "Manual");
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
    }

    #[test]
    fn test_scan_params_default() {
        let params = ScanParams::default();
        assert_eq!(params.timeout, Duration::from_secs(5));
        assert!(params.preferred_device.is_none());
    }
}
