use crate::{
    error::{PadError, Result},
    types::{PadMode, StatusReading},
};
use bytes::{BufMut, Bytes, BytesMut};
use std::time::{Duration, Instant};

/// Command frame size in bytes
pub const FRAME_SIZE: usize = 6;

/// First byte of every outgoing command frame
pub const FRAME_HEADER: u8 = 0xF7;

/// Protocol marker following the header in command frames
pub const FRAME_MARKER: u8 = 0xA2;

/// Last byte of every outgoing command frame
pub const FRAME_TRAILER: u8 = 0xFD;

/// Two-byte signature opening every status notification frame
///
/// Frames that do not start with this signature are emitted by the pad for
/// purposes this layer does not interpret and are silently ignored.
pub const STATUS_SIGNATURE: [u8; 2] = [0xF8, 0xA2];

/// Minimum status payload length after the signature bytes
pub const MIN_STATUS_PAYLOAD: usize = 12;

/// Maximum belt speed in km/h accepted by speed commands
pub const MAX_SPEED_KMH: f64 = 6.0;

/// Opcodes for the 6-byte command frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Request a status notification
    RequestStats = 0x00,
    /// Set the belt speed (payload = km/h × 10)
    SetSpeed = 0x01,
    /// Set the operating mode (payload = mode byte)
    SetMode = 0x02,
    /// Start the belt
    StartBelt = 0x04,
}

/// High-level commands accepted by the session driver
///
/// Immutable once created; produced by intent handlers and consumed exactly
/// once by the writer after expansion into wire frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Start the belt and bring it to the target speed in km/h
    Start {
        /// Speed the belt should reach once started
        target_speed: f64,
    },
    /// Stop the belt (equivalent to a speed change to 0)
    Stop,
    /// Change the belt speed in km/h
    ChangeSpeed(f64),
}

/// Compute the unsigned 8-bit wraparound sum over the given bytes
#[must_use]
pub fn wrapping_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Encode a command frame for the given opcode and single payload byte
///
/// Layout: `[header, marker, opcode, payload, checksum, trailer]`. The
/// checksum covers the interior bytes, i.e. everything after the header and
/// before the checksum position. Encoding never fails; payload widths are
/// fixed per opcode by construction.
#[must_use]
pub fn encode_command(opcode: Opcode, payload: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_SIZE);
    buf.put_u8(FRAME_HEADER);
    buf.put_u8(FRAME_MARKER);
    buf.put_u8(opcode as u8);
    buf.put_u8(payload);
    buf.put_u8(wrapping_checksum(&buf[1..]));
    buf.put_u8(FRAME_TRAILER);
    buf.freeze()
}

/// Build a status-request frame
#[must_use]
pub fn request_stats() -> Bytes {
    encode_command(Opcode::RequestStats, 0)
}

/// Build a start-belt frame
#[must_use]
pub fn start_belt() -> Bytes {
    encode_command(Opcode::StartBelt, 1)
}

/// Build a mode-change frame
#[must_use]
pub fn set_mode(mode: PadMode) -> Bytes {
    encode_command(Opcode::SetMode, mode as u8)
}

/// Build a speed-change frame
///
/// # Panics
///
/// Panics if `speed` is outside `[0, 6]` km/h. Out-of-range speeds are a
/// caller contract violation, not a runtime condition.
#[must_use]
pub fn set_speed(speed: f64) -> Bytes {
    assert!(
        (0.0..=MAX_SPEED_KMH).contains(&speed),
        "speed {speed} km/h out of range [0, {MAX_SPEED_KMH}]"
    );
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let raw = (speed * 10.0) as u8;
    encode_command(Opcode::SetSpeed, raw)
}

fn read_u24_be(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

/// Decode a received notification frame into a status reading
///
/// Returns `Ok(None)` for frames that do not carry the status signature —
/// the pad emits other frame types this layer does not interpret. Frames
/// with the signature but fewer than [`MIN_STATUS_PAYLOAD`] payload bytes
/// fail with [`PadError::MalformedFrame`].
///
/// Incoming frames carry no validated checksum; they are trusted beyond the
/// signature check.
///
/// # Errors
///
/// Returns [`PadError::MalformedFrame`] if the status payload is undersized.
pub fn decode_status(frame: &[u8]) -> Result<Option<StatusReading>> {
    if frame.len() < 2 || frame[..2] != STATUS_SIGNATURE {
        return Ok(None);
    }

    let payload = &frame[2..];
    if payload.len() < MIN_STATUS_PAYLOAD {
        return Err(PadError::MalformedFrame { len: payload.len() });
    }

    let elapsed_s = read_u24_be(&payload[2..5]);
    let distance_raw = read_u24_be(&payload[5..8]);

    Ok(Some(StatusReading {
        speed: f64::from(payload[0]) / 10.0,
        mode: PadMode::from(payload[1]),
        elapsed: Duration::from_secs(u64::from(elapsed_s)),
        distance_km: f64::from(distance_raw) / 100.0,
        steps: read_u24_be(&payload[8..11]),
        observed_at: Instant::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = set_mode(PadMode::Manual);
        assert_eq!(&frame[..], &[0xF7, 0xA2, 0x02, 0x01, 0xA5, 0xFD]);

        let frame = start_belt();
        assert_eq!(&frame[..], &[0xF7, 0xA2, 0x04, 0x01, 0xA7, 0xFD]);

        let frame = request_stats();
        assert_eq!(&frame[..], &[0xF7, 0xA2, 0x00, 0x00, 0xA2, 0xFD]);
    }

    #[test]
    fn test_speed_frame() {
        let frame = set_speed(2.5);
        assert_eq!(frame[2], Opcode::SetSpeed as u8);
        assert_eq!(frame[3], 25);
        assert_eq!(frame[4], 0xA2u8.wrapping_add(1).wrapping_add(25));

        let frame = set_speed(0.0);
        assert_eq!(frame[3], 0);

        let frame = set_speed(6.0);
        assert_eq!(frame[3], 60);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_speed_out_of_range_panics() {
        let _ = set_speed(6.5);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_negative_speed_panics() {
        let _ = set_speed(-0.1);
    }

    #[test]
    fn test_checksum_matches_independent_sum() {
        // every encoded frame's checksum byte must equal the wraparound sum
        // of the bytes between header and checksum position
        for payload in [0u8, 1, 25, 60, 200, 255] {
            for opcode in [
                Opcode::RequestStats,
                Opcode::SetSpeed,
                Opcode::SetMode,
                Opcode::StartBelt,
            ] {
                let frame = encode_command(opcode, payload);
                let expected: u8 = frame[1..frame.len() - 2]
                    .iter()
                    .fold(0u8, |s, b| s.wrapping_add(*b));
                assert_eq!(frame[frame.len() - 2], expected);
            }
        }
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(wrapping_checksum(&[200, 100]), 44);
        assert_eq!(wrapping_checksum(&[255, 1]), 0);
        assert_eq!(wrapping_checksum(&[]), 0);
    }

    #[test]
    fn test_decode_status_reading() {
        let mut frame = STATUS_SIGNATURE.to_vec();
        frame.extend_from_slice(&[25, 1, 0, 0, 10, 0, 0, 50, 0, 0, 7, 0]);

        let reading = decode_status(&frame).unwrap().unwrap();
        assert!((reading.speed - 2.5).abs() < f64::EPSILON);
        assert_eq!(reading.mode, PadMode::Manual);
        assert_eq!(reading.elapsed, Duration::from_secs(10));
        assert!((reading.distance_km - 0.50).abs() < f64::EPSILON);
        assert_eq!(reading.steps, 7);
    }

    #[test]
    fn test_decode_status_big_endian_fields() {
        let mut frame = STATUS_SIGNATURE.to_vec();
        frame.extend_from_slice(&[0, 2, 0x01, 0x02, 0x03, 0, 0, 0, 0x00, 0x10, 0x00, 0]);

        let reading = decode_status(&frame).unwrap().unwrap();
        assert_eq!(reading.mode, PadMode::Standby);
        assert_eq!(reading.elapsed, Duration::from_secs(0x0001_0203));
        assert_eq!(reading.steps, 0x1000);
    }

    #[test]
    fn test_decode_truncated_payload_fails() {
        for len in 0..MIN_STATUS_PAYLOAD {
            let mut frame = STATUS_SIGNATURE.to_vec();
            frame.extend_from_slice(&vec![0u8; len]);

            match decode_status(&frame) {
                Err(PadError::MalformedFrame { len: reported }) => assert_eq!(reported, len),
                other => panic!("expected MalformedFrame for len {len}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_ignores_other_signatures() {
        // command echo header, not a status frame
        let frame = [0xF7, 0xA2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode_status(&frame).unwrap().is_none());

        // too short to even carry a signature
        assert!(decode_status(&[0xF8]).unwrap().is_none());
        assert!(decode_status(&[]).unwrap().is_none());
    }
}
