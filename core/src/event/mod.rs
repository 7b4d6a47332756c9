// Event and command model — the typed surface between the protocol
// drivers and the application.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the six cube faces, in the wire order U, R, F, D, L, B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    Up,
    Right,
    Front,
    Down,
    Left,
    Back,
}

pub const FACE_LETTERS: [char; 6] = ['U', 'R', 'F', 'D', 'L', 'B'];

impl Face {
    /// Wire index 0..=5.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Face::Up),
            1 => Some(Face::Right),
            2 => Some(Face::Front),
            3 => Some(Face::Down),
            4 => Some(Face::Left),
            5 => Some(Face::Back),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        FACE_LETTERS[self.index()]
    }
}

/// Turn direction of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Clockwise,
    Counterclockwise,
}

impl Direction {
    pub fn from_bit(bit: u32) -> Self {
        if bit == 1 {
            Direction::Counterclockwise
        } else {
            Direction::Clockwise
        }
    }
}

/// A single face turn reported by the cube.
///
/// `host_ts` and `cube_ts` are `None` for moves recovered through the
/// history sub-protocol — the device does not retransmit timing for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveEvent {
    pub face: Face,
    pub direction: Direction,
    /// Device move counter, wrapping at 256.
    pub serial: u8,
    /// Host monotonic clock, milliseconds.
    pub host_ts: Option<u64>,
    /// Cube internal clock, milliseconds.
    pub cube_ts: Option<u64>,
}

impl MoveEvent {
    /// Standard notation: face letter, primed for counterclockwise.
    pub fn notation(&self) -> String {
        match self.direction {
            Direction::Clockwise => self.face.letter().to_string(),
            Direction::Counterclockwise => format!("{}'", self.face.letter()),
        }
    }

    /// Parse `"R"` / `"R'"` style notation.
    pub fn parse_notation(s: &str) -> Option<(Face, Direction)> {
        let mut chars = s.trim().chars();
        let letter = chars.next()?;
        let face = Face::from_index(FACE_LETTERS.iter().position(|&c| c == letter)?)?;
        let direction = match chars.next() {
            None | Some(' ') => Direction::Clockwise,
            Some('\'') => Direction::Counterclockwise,
            _ => return None,
        };
        Some((face, direction))
    }
}

impl fmt::Display for MoveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.notation())
    }
}

/// A full cube-state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceletsEvent {
    pub serial: u8,
    /// 54-character facelet string in U, R, F, D, L, B face order.
    pub facelets: String,
    pub state: crate::cube::facelets::CubeState,
}

/// Orientation quaternion, right-handed: +X red, +Y blue, +Z white.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Angular velocity, raw signed 4-bit components from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngularVelocity {
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GyroEvent {
    pub quaternion: Quaternion,
    pub velocity: Option<AngularVelocity>,
}

/// Device identification, assembled from one (Gen2/Gen3) or four (Gen4)
/// frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareEvent {
    pub name: String,
    pub hardware_version: String,
    pub software_version: String,
    /// `YYYY-MM-DD`, reported by Gen4 devices only.
    pub production_date: Option<String>,
    pub gyro_supported: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryEvent {
    /// Charge level, clamped to 100.
    pub percent: u8,
}

/// Timer state machine, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerState {
    Disconnect,
    GetSet,
    HandsOff,
    Running,
    Stopped,
    Idle,
    HandsOn,
    Finished,
}

impl TimerState {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(TimerState::Disconnect),
            1 => Some(TimerState::GetSet),
            2 => Some(TimerState::HandsOff),
            3 => Some(TimerState::Running),
            4 => Some(TimerState::Stopped),
            5 => Some(TimerState::Idle),
            6 => Some(TimerState::HandsOn),
            7 => Some(TimerState::Finished),
            _ => None,
        }
    }
}

/// A solve time as the timer records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedTime {
    pub minutes: u8,
    pub seconds: u8,
    pub milliseconds: u16,
}

impl RecordedTime {
    /// Total milliseconds.
    pub fn as_timestamp(&self) -> u64 {
        60_000 * self.minutes as u64 + 1_000 * self.seconds as u64 + self.milliseconds as u64
    }
}

impl fmt::Display for RecordedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:02}.{:03}",
            self.minutes, self.seconds, self.milliseconds
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerEvent {
    pub state: TimerState,
    /// Present only when `state` is [`TimerState::Stopped`].
    pub recorded_time: Option<RecordedTime>,
}

/// Everything a session can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    Move(MoveEvent),
    Facelets(FaceletsEvent),
    Gyro(GyroEvent),
    Hardware(HardwareEvent),
    Battery(BatteryEvent),
    Timer(TimerEvent),
    Disconnect,
}

/// Commands accepted by the cube drivers.
///
/// `RequestMoveHistory` is issued internally by the move reconciler; it is
/// public so replay tooling can drive drivers directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    RequestFacelets,
    RequestHardware,
    RequestBattery,
    RequestReset,
    RequestMoveHistory { serial: u8, count: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_index_roundtrip() {
        for i in 0..6 {
            assert_eq!(Face::from_index(i).unwrap().index(), i);
        }
        assert!(Face::from_index(6).is_none());
    }

    #[test]
    fn test_move_notation() {
        let mv = MoveEvent {
            face: Face::Right,
            direction: Direction::Clockwise,
            serial: 1,
            host_ts: None,
            cube_ts: None,
        };
        assert_eq!(mv.notation(), "R");

        let mv = MoveEvent {
            face: Face::Up,
            direction: Direction::Counterclockwise,
            ..mv
        };
        assert_eq!(mv.notation(), "U'");
    }

    #[test]
    fn test_parse_notation() {
        assert_eq!(
            MoveEvent::parse_notation("F"),
            Some((Face::Front, Direction::Clockwise))
        );
        assert_eq!(
            MoveEvent::parse_notation("B'"),
            Some((Face::Back, Direction::Counterclockwise))
        );
        assert_eq!(
            MoveEvent::parse_notation("L "),
            Some((Face::Left, Direction::Clockwise))
        );
        assert!(MoveEvent::parse_notation("X").is_none());
        assert!(MoveEvent::parse_notation("").is_none());
    }

    #[test]
    fn test_recorded_time_timestamp() {
        let time = RecordedTime {
            minutes: 1,
            seconds: 2,
            milliseconds: 345,
        };
        assert_eq!(time.as_timestamp(), 62_345);
        assert_eq!(time.to_string(), "1:02.345");
    }

    #[test]
    fn test_timer_state_wire_values() {
        assert_eq!(TimerState::from_wire(4), Some(TimerState::Stopped));
        assert_eq!(TimerState::from_wire(0), Some(TimerState::Disconnect));
        assert_eq!(TimerState::from_wire(8), None);
    }

    #[test]
    fn test_event_json_roundtrip() {
        let event = DeviceEvent::Move(MoveEvent {
            face: Face::Back,
            direction: Direction::Counterclockwise,
            serial: 200,
            host_ts: Some(1_234),
            cube_ts: None,
        });
        let json = serde_json::to_string(&event).unwrap();
        let restored: DeviceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }
}
