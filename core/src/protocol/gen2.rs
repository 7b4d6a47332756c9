// Gen2 cube protocol.
//
// State frames open with a 4-bit event type. Move frames carry up to seven
// backlogged moves (serial delta, newest first) with 16-bit elapsed-time
// deltas, so the generation recovers short notification losses without a
// history sub-protocol. Commands are fixed 20-byte frames keyed by the
// first byte.

use crate::cube::facelets::CubeState;
use crate::event::{
    AngularVelocity, BatteryEvent, Command, DeviceEvent, Direction, Face, FaceletsEvent,
    GyroEvent, HardwareEvent, MoveEvent, Quaternion,
};
use crate::protocol::{sign_magnitude_16, sign_magnitude_4, Driver, DriverOutput};
use crate::wire::BitView;

const EVENT_GYRO: u32 = 0x1;
const EVENT_MOVE: u32 = 0x2;
const EVENT_FACELETS: u32 = 0x4;
const EVENT_HARDWARE: u32 = 0x5;
const EVENT_BATTERY: u32 = 0x9;
const EVENT_DISCONNECT: u32 = 0xD;

const COMMAND_LEN: usize = 20;

/// Solved-state payload shared by every generation's reset command.
pub(crate) const RESET_PAYLOAD: [u8; 12] = [
    0x39, 0x77, 0x00, 0x00, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0x00, 0x00,
];

/// Driver for Gen2 cubes.
#[derive(Debug, Default)]
pub struct Gen2Driver {
    /// Serial of the newest move seen; `None` until the first facelet
    /// snapshot. Overwritten on every move frame, even when the delta is
    /// zero.
    last_serial: Option<u8>,
    /// Running sum of per-move elapsed deltas — Gen2 reports deltas, not
    /// an absolute cube clock.
    cube_ts_accum: u64,
    last_local_ts: Option<u64>,
}

impl Gen2Driver {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_move(&mut self, view: &BitView<'_>, now_ms: u64, out: &mut DriverOutput) {
        let serial = view.bit_word(4, 8) as u8;
        // Moves before the first facelet snapshot have no reference state
        // to apply to.
        let Some(last) = self.last_serial else {
            return;
        };
        let diff = serial.wrapping_sub(last).min(7);
        self.last_serial = Some(serial);

        let prev_local = self.last_local_ts;
        for j in 0..diff {
            let i = (diff - 1 - j) as usize;
            let face_index = view.bit_word(12 + 5 * i, 4) as usize;
            let direction = Direction::from_bit(view.bit_word(16 + 5 * i, 1));
            let mut elapsed = view.bit_word_le(47 + 16 * i, 16) as u64;
            if elapsed == 0 {
                // 16-bit elapsed register overflowed; approximate from the
                // host clock.
                elapsed = prev_local.map_or(0, |t| now_ms.saturating_sub(t));
            }
            self.cube_ts_accum += elapsed;

            let Some(face) = Face::from_index(face_index) else {
                tracing::debug!(face_index, "gen2 move with unknown face, skipping");
                continue;
            };
            let freshest = i == 0;
            out.events.push(DeviceEvent::Move(MoveEvent {
                face,
                direction,
                serial: serial.wrapping_sub(i as u8),
                host_ts: freshest.then_some(now_ms),
                cube_ts: Some(self.cube_ts_accum),
            }));
        }
        self.last_local_ts = Some(now_ms);
    }

    fn handle_facelets(&mut self, view: &BitView<'_>, out: &mut DriverOutput) {
        let serial = view.bit_word(4, 8) as u8;

        let mut cp = [0u8; 7];
        let mut co = [0u8; 7];
        let mut ep = [0u8; 11];
        let mut eo = [0u8; 11];
        for i in 0..7 {
            cp[i] = view.bit_word(12 + 3 * i, 3) as u8;
            co[i] = view.bit_word(33 + 2 * i, 2) as u8;
        }
        for i in 0..11 {
            ep[i] = view.bit_word(47 + 4 * i, 4) as u8;
            eo[i] = view.bit_word(91 + i, 1) as u8;
        }
        let state = CubeState::from_wire(cp, co, ep, eo);

        if self.last_serial.is_none() {
            self.last_serial = Some(serial);
        }
        out.events.push(DeviceEvent::Facelets(FaceletsEvent {
            serial,
            facelets: state.to_facelets(),
            state,
        }));
    }

    fn handle_gyro(&self, view: &BitView<'_>, out: &mut DriverOutput) {
        let quaternion = Quaternion {
            w: sign_magnitude_16(view.bit_word(4, 16)),
            x: sign_magnitude_16(view.bit_word(20, 16)),
            y: sign_magnitude_16(view.bit_word(36, 16)),
            z: sign_magnitude_16(view.bit_word(52, 16)),
        };
        let velocity = AngularVelocity {
            x: sign_magnitude_4(view.bit_word(68, 4)),
            y: sign_magnitude_4(view.bit_word(72, 4)),
            z: sign_magnitude_4(view.bit_word(76, 4)),
        };
        out.events.push(DeviceEvent::Gyro(GyroEvent {
            quaternion,
            velocity: Some(velocity),
        }));
    }

    fn handle_hardware(&self, view: &BitView<'_>, out: &mut DriverOutput) {
        let hardware_version =
            format!("{}.{}", view.bit_word(8, 8), view.bit_word(16, 8));
        let software_version =
            format!("{}.{}", view.bit_word(24, 8), view.bit_word(32, 8));
        let name: String = (0..8)
            .map(|i| view.bit_word(40 + 8 * i, 8) as u8)
            .take_while(|&b| b != 0)
            .map(char::from)
            .collect();
        let gyro_supported = view.bit_word(104, 1) == 1;
        out.events.push(DeviceEvent::Hardware(HardwareEvent {
            name,
            hardware_version,
            software_version,
            production_date: None,
            gyro_supported,
        }));
    }
}

impl Driver for Gen2Driver {
    fn encode_command(&self, command: &Command) -> Option<Vec<u8>> {
        let mut frame = vec![0u8; COMMAND_LEN];
        match command {
            Command::RequestFacelets => frame[0] = 0x04,
            Command::RequestHardware => frame[0] = 0x05,
            Command::RequestBattery => frame[0] = 0x09,
            Command::RequestReset => {
                frame[0] = 0x0A;
                frame[1] = 0x05;
                frame[2..14].copy_from_slice(&RESET_PAYLOAD);
            }
            // Gen2 has no history sub-protocol.
            Command::RequestMoveHistory { .. } => return None,
        }
        Some(frame)
    }

    fn handle_state(&mut self, frame: &[u8], now_ms: u64) -> DriverOutput {
        let mut out = DriverOutput::default();
        let view = BitView::new(frame);
        if view.is_empty() {
            return out;
        }
        match view.bit_word(0, 4) {
            EVENT_GYRO => self.handle_gyro(&view, &mut out),
            EVENT_MOVE => self.handle_move(&view, now_ms, &mut out),
            EVENT_FACELETS => self.handle_facelets(&view, &mut out),
            EVENT_HARDWARE => self.handle_hardware(&view, &mut out),
            EVENT_BATTERY => {
                let percent = view.bit_word(8, 8).min(100) as u8;
                out.events.push(DeviceEvent::Battery(BatteryEvent { percent }));
            }
            EVENT_DISCONNECT => out.disconnect = true,
            other => {
                tracing::debug!(event = other, "gen2 frame with unknown event type dropped");
            }
        }
        out
    }
}
