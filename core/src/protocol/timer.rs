// Smart-timer protocol.
//
// Timer state frames are plaintext: a 0xFE magic byte, a length byte, a
// CRC-16/CCITT-FALSE trailer (little-endian) over the body between the
// two-byte prefix and the checksum. A STOPPED transition embeds the
// recorded solve time. The time characteristic additionally serves a
// 16-byte blob holding the displayed time and the three previous solves.

use crate::event::{Command, DeviceEvent, RecordedTime, TimerEvent, TimerState};
use crate::protocol::{Driver, DriverOutput};
use crate::wire::crc16;
use crate::ProtocolError;

const MAGIC: u8 = 0xFE;

// Magic + length + state + CRC.
const MIN_FRAME_LEN: usize = 6;

const STATE_OFFSET: usize = 3;
const TIME_OFFSET: usize = 4;

/// Driver for the GAN smart timer.
///
/// Stateless between frames: the timer retransmits its full state on every
/// transition. Malformed frames are dropped without disturbing the session.
#[derive(Debug, Default)]
pub struct TimerDriver;

impl TimerDriver {
    pub fn new() -> Self {
        Self
    }

    fn decode_state(frame: &[u8]) -> Result<TimerEvent, ProtocolError> {
        if frame.is_empty() || frame[0] != MAGIC {
            return Err(ProtocolError::FrameRejected("timer frame without magic byte"));
        }
        if frame.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::FrameRejected("timer frame too short"));
        }
        let crc_offset = frame.len() - 2;
        let expected = u16::from_le_bytes([frame[crc_offset], frame[crc_offset + 1]]);
        if crc16(&frame[2..crc_offset]) != expected {
            return Err(ProtocolError::FrameRejected("timer frame checksum mismatch"));
        }

        let state = TimerState::from_wire(frame[STATE_OFFSET])
            .ok_or(ProtocolError::FrameRejected("timer frame with unknown state"))?;

        let recorded_time = if state == TimerState::Stopped {
            Some(decode_time(frame.get(TIME_OFFSET..TIME_OFFSET + 4).ok_or(
                ProtocolError::FrameRejected("stopped frame without recorded time"),
            )?))
        } else {
            None
        };

        Ok(TimerEvent {
            state,
            recorded_time,
        })
    }
}

impl Driver for TimerDriver {
    fn encode_command(&self, _command: &Command) -> Option<Vec<u8>> {
        // The timer accepts no commands; everything is notification-driven.
        None
    }

    fn handle_state(&mut self, frame: &[u8], _now_ms: u64) -> DriverOutput {
        let mut out = DriverOutput::default();
        match Self::decode_state(frame) {
            Ok(event) => out.events.push(DeviceEvent::Timer(event)),
            Err(err) => tracing::debug!(%err, "timer frame dropped"),
        }
        out
    }

    fn on_transport_disconnect(&mut self) -> Vec<DeviceEvent> {
        // The timer has an explicit DISCONNECT state; synthesize it so
        // consumers see the same transition a graceful power-off produces.
        vec![DeviceEvent::Timer(TimerEvent {
            state: TimerState::Disconnect,
            recorded_time: None,
        })]
    }
}

fn decode_time(bytes: &[u8]) -> RecordedTime {
    RecordedTime {
        minutes: bytes[0],
        seconds: bytes[1],
        milliseconds: u16::from_le_bytes([bytes[2], bytes[3]]),
    }
}

/// Recorded times served by the timer's time characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedTimes {
    /// The time currently shown on the display.
    pub display: RecordedTime,
    /// The three solves before it, most recent first.
    pub previous: [RecordedTime; 3],
}

/// Decode the 16-byte recorded-times blob.
pub fn decode_recorded_times(blob: &[u8]) -> Result<RecordedTimes, ProtocolError> {
    if blob.len() != 16 {
        return Err(ProtocolError::FrameRejected("recorded-times blob must be 16 bytes"));
    }
    Ok(RecordedTimes {
        display: decode_time(&blob[0..4]),
        previous: [
            decode_time(&blob[4..8]),
            decode_time(&blob[8..12]),
            decode_time(&blob[12..16]),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(state: u8, time: Option<[u8; 4]>) -> Vec<u8> {
        let mut body = vec![0x00, state];
        if let Some(time) = time {
            body.extend_from_slice(&time);
        }
        let mut frame = vec![MAGIC, (body.len() + 4) as u8];
        frame.extend_from_slice(&body);
        let crc = crc16(&frame[2..]);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    #[test]
    fn test_stopped_frame_carries_recorded_time() {
        let mut driver = TimerDriver::new();
        let out = driver.handle_state(&frame(4, Some([0, 12, 0x64, 0x00])), 0);

        let [DeviceEvent::Timer(event)] = &out.events[..] else {
            panic!("expected timer event, got {:?}", out.events);
        };
        assert_eq!(event.state, TimerState::Stopped);
        let time = event.recorded_time.unwrap();
        assert_eq!((time.minutes, time.seconds, time.milliseconds), (0, 12, 100));
        assert_eq!(time.as_timestamp(), 12_100);
        assert_eq!(time.to_string(), "0:12.100");
    }

    #[test]
    fn test_state_transitions_without_time() {
        let mut driver = TimerDriver::new();
        for (wire, state) in [
            (0, TimerState::Disconnect),
            (1, TimerState::GetSet),
            (2, TimerState::HandsOff),
            (3, TimerState::Running),
            (5, TimerState::Idle),
            (6, TimerState::HandsOn),
            (7, TimerState::Finished),
        ] {
            let out = driver.handle_state(&frame(wire, None), 0);
            assert_eq!(
                out.events,
                vec![DeviceEvent::Timer(TimerEvent {
                    state,
                    recorded_time: None,
                })]
            );
        }
    }

    #[test]
    fn test_bad_magic_dropped() {
        let mut driver = TimerDriver::new();
        let mut bad = frame(3, None);
        bad[0] = 0xFD;
        assert!(driver.handle_state(&bad, 0).events.is_empty());
        assert!(driver.handle_state(&[], 0).events.is_empty());
    }

    #[test]
    fn test_bad_crc_dropped() {
        let mut driver = TimerDriver::new();
        let mut bad = frame(3, None);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        assert!(driver.handle_state(&bad, 0).events.is_empty());
    }

    #[test]
    fn test_unknown_state_dropped() {
        let mut driver = TimerDriver::new();
        assert!(driver.handle_state(&frame(9, None), 0).events.is_empty());
    }

    #[test]
    fn test_transport_disconnect_synthesizes_event() {
        let mut driver = TimerDriver::new();
        assert_eq!(
            driver.on_transport_disconnect(),
            vec![DeviceEvent::Timer(TimerEvent {
                state: TimerState::Disconnect,
                recorded_time: None,
            })]
        );
    }

    #[test]
    fn test_recorded_times_blob() {
        let mut blob = Vec::new();
        for (min, sec, ms) in [(0u8, 12u8, 100u16), (1, 2, 345), (0, 59, 999), (0, 8, 0)] {
            blob.push(min);
            blob.push(sec);
            blob.extend_from_slice(&ms.to_le_bytes());
        }
        let times = decode_recorded_times(&blob).unwrap();
        assert_eq!(times.display.as_timestamp(), 12_100);
        assert_eq!(times.previous[0].as_timestamp(), 62_345);
        assert_eq!(times.previous[1].as_timestamp(), 59_999);
        assert_eq!(times.previous[2].as_timestamp(), 8_000);

        assert!(decode_recorded_times(&blob[..12]).is_err());
    }

    #[test]
    fn test_no_commands() {
        let driver = TimerDriver::new();
        assert!(driver.encode_command(&Command::RequestReset).is_none());
    }
}
