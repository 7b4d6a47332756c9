// Gen3 cube protocol.
//
// Frames open with a 0x55 magic byte, an 8-bit event type and an 8-bit
// data length. Unlike Gen2, move frames carry exactly one move with an
// absolute 32-bit cube clock; losses are repaired through the move-history
// sub-protocol via the shared reconciler.

use crate::cube::facelets::CubeState;
use crate::event::{
    BatteryEvent, Command, DeviceEvent, Direction, Face, FaceletsEvent, HardwareEvent, MoveEvent,
};
use crate::protocol::gen2::RESET_PAYLOAD;
use crate::protocol::{Driver, DriverOutput, MoveReconciler};
use crate::wire::BitView;

const MAGIC: u32 = 0x55;

const EVENT_MOVE: u32 = 0x01;
const EVENT_FACELETS: u32 = 0x02;
const EVENT_HISTORY: u32 = 0x06;
const EVENT_HARDWARE: u32 = 0x07;
const EVENT_BATTERY: u32 = 0x10;
const EVENT_DISCONNECT: u32 = 0x11;

const COMMAND_PREFIX: u8 = 0x68;
const COMMAND_LEN: usize = 16;

// Move frames carry the face as a one-hot mask; position in this table is
// the U, R, F, D, L, B index.
const FACE_MASKS: [u32; 6] = [2, 32, 8, 1, 16, 4];

// History frames carry a 3-bit face code instead; same position rule.
const HISTORY_FACE_CODES: [u32; 6] = [1, 5, 3, 0, 4, 2];

/// Driver for Gen3 cubes.
#[derive(Debug, Default)]
pub struct Gen3Driver {
    reconciler: MoveReconciler,
}

impl Gen3Driver {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_move(&mut self, view: &BitView<'_>, now_ms: u64, out: &mut DriverOutput) {
        let cube_ts = view.bit_word_le(24, 32) as u64;
        let serial = (view.bit_word_le(56, 16) & 0xFF) as u8;
        let direction = Direction::from_bit(view.bit_word(72, 2));
        let mask = view.bit_word(74, 6);
        let Some(face) = FACE_MASKS
            .iter()
            .position(|&m| m == mask)
            .and_then(Face::from_index)
        else {
            tracing::debug!(mask, "gen3 move with unknown face mask dropped");
            return;
        };
        self.reconciler.push_realtime(
            MoveEvent {
                face,
                direction,
                serial,
                host_ts: Some(now_ms),
                cube_ts: Some(cube_ts),
            },
            now_ms,
            out,
        );
    }

    fn handle_history(&mut self, view: &BitView<'_>, length: u32, out: &mut DriverOutput) {
        let start = view.bit_word(24, 8) as u8;
        let count = 2 * length.saturating_sub(1);
        for i in 0..count as usize {
            let code = view.bit_word(32 + 4 * i, 3);
            let Some(face) = HISTORY_FACE_CODES
                .iter()
                .position(|&c| c == code)
                .and_then(Face::from_index)
            else {
                continue;
            };
            let direction = Direction::from_bit(view.bit_word(35 + 4 * i, 1));
            // Newest first: entry i is `start - i`. Timing is not
            // retransmitted for recovered moves.
            self.reconciler.inject_history(
                MoveEvent {
                    face,
                    direction,
                    serial: start.wrapping_sub(i as u8),
                    host_ts: None,
                    cube_ts: None,
                },
                out,
            );
        }
    }

    fn handle_facelets(&mut self, view: &BitView<'_>, now_ms: u64, out: &mut DriverOutput) {
        let serial = (view.bit_word_le(24, 16) & 0xFF) as u8;

        let mut cp = [0u8; 7];
        let mut co = [0u8; 7];
        let mut ep = [0u8; 11];
        let mut eo = [0u8; 11];
        for i in 0..7 {
            cp[i] = view.bit_word(40 + 3 * i, 3) as u8;
            co[i] = view.bit_word(61 + 2 * i, 2) as u8;
        }
        for i in 0..11 {
            ep[i] = view.bit_word(75 + 4 * i, 4) as u8;
            eo[i] = view.bit_word(119 + i, 1) as u8;
        }
        let state = CubeState::from_wire(cp, co, ep, eo);

        out.events.push(DeviceEvent::Facelets(FaceletsEvent {
            serial,
            facelets: state.to_facelets(),
            state,
        }));
        self.reconciler.observe_facelets(serial, now_ms, out);
    }

    fn handle_hardware(&self, view: &BitView<'_>, out: &mut DriverOutput) {
        let hardware_version =
            format!("{}.{}", view.bit_word(24, 4), view.bit_word(28, 4));
        let software_version =
            format!("{}.{}", view.bit_word(32, 4), view.bit_word(36, 4));
        let name: String = (0..5)
            .map(|i| view.bit_word(40 + 8 * i, 8) as u8)
            .take_while(|&b| b != 0)
            .map(char::from)
            .collect();
        out.events.push(DeviceEvent::Hardware(HardwareEvent {
            name,
            hardware_version,
            software_version,
            production_date: None,
            // Gen3 hardware has no gyroscope.
            gyro_supported: false,
        }));
    }
}

impl Driver for Gen3Driver {
    fn encode_command(&self, command: &Command) -> Option<Vec<u8>> {
        let mut frame = vec![0u8; COMMAND_LEN];
        frame[0] = COMMAND_PREFIX;
        match command {
            Command::RequestFacelets => frame[1] = 0x01,
            Command::RequestHardware => frame[1] = 0x04,
            Command::RequestBattery => frame[1] = 0x07,
            Command::RequestReset => {
                frame[1] = 0x05;
                frame[2..14].copy_from_slice(&RESET_PAYLOAD);
            }
            Command::RequestMoveHistory { serial, count } => {
                frame[1] = 0x03;
                frame[2] = *serial;
                frame[4] = *count;
            }
        }
        Some(frame)
    }

    fn handle_state(&mut self, frame: &[u8], now_ms: u64) -> DriverOutput {
        let mut out = DriverOutput::default();
        let view = BitView::new(frame);
        if view.bit_word(0, 8) != MAGIC {
            tracing::debug!("gen3 frame without magic byte dropped");
            return out;
        }
        let length = view.bit_word(16, 8);
        if length == 0 {
            tracing::debug!("gen3 frame with zero data length dropped");
            return out;
        }
        match view.bit_word(8, 8) {
            EVENT_MOVE => self.handle_move(&view, now_ms, &mut out),
            EVENT_FACELETS => self.handle_facelets(&view, now_ms, &mut out),
            EVENT_HISTORY => self.handle_history(&view, length, &mut out),
            EVENT_HARDWARE => self.handle_hardware(&view, &mut out),
            EVENT_BATTERY => {
                let percent = view.bit_word(24, 8).min(100) as u8;
                out.events.push(DeviceEvent::Battery(BatteryEvent { percent }));
            }
            EVENT_DISCONNECT => out.disconnect = true,
            other => {
                tracing::debug!(event = other, "gen3 frame with unknown event type dropped");
            }
        }
        out
    }
}
