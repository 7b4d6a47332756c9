// Gen4 cube protocol.
//
// Frame shape follows Gen3 (single move per frame, absolute cube clock,
// history recovery through the shared reconciler) with a different wire
// layout: the event type is a full leading byte and hardware information
// is split over four sub-frames that must all arrive before one event is
// emitted.

use crate::cube::facelets::CubeState;
use crate::event::{
    AngularVelocity, BatteryEvent, Command, DeviceEvent, Direction, Face, FaceletsEvent,
    GyroEvent, HardwareEvent, MoveEvent, Quaternion,
};
use crate::protocol::gen2::RESET_PAYLOAD;
use crate::protocol::{sign_magnitude_16, sign_magnitude_4, Driver, DriverOutput, MoveReconciler};
use crate::wire::BitView;

const EVENT_MOVE: u32 = 0x01;
const EVENT_HISTORY: u32 = 0xD1;
const EVENT_GYRO: u32 = 0xEC;
const EVENT_FACELETS: u32 = 0xED;
const EVENT_BATTERY: u32 = 0xEF;
const EVENT_DISCONNECT: u32 = 0xEA;
const EVENT_HW_DATE: u32 = 0xFA;
const EVENT_HW_NAME: u32 = 0xFC;
const EVENT_HW_SOFTWARE: u32 = 0xFD;
const EVENT_HW_HARDWARE: u32 = 0xFE;

const COMMAND_LEN: usize = 20;

// Same 3-bit face coding as the Gen3 history sub-protocol.
const HISTORY_FACE_CODES: [u32; 6] = [1, 5, 3, 0, 4, 2];

/// The only Gen4 model with a gyroscope.
const GYRO_MODEL: &str = "GAN12uiM";

/// Hardware info arrives as four tagged sub-frames in arbitrary order.
#[derive(Debug, Default)]
struct PartialHardware {
    date: Option<String>,
    name: Option<String>,
    software: Option<String>,
    hardware: Option<String>,
}

impl PartialHardware {
    fn complete(&self) -> Option<HardwareEvent> {
        let name = self.name.clone()?;
        let gyro_supported = name == GYRO_MODEL;
        Some(HardwareEvent {
            name,
            hardware_version: self.hardware.clone()?,
            software_version: self.software.clone()?,
            production_date: Some(self.date.clone()?),
            gyro_supported,
        })
    }
}

/// Driver for Gen4 cubes.
#[derive(Debug, Default)]
pub struct Gen4Driver {
    reconciler: MoveReconciler,
    hw_info: PartialHardware,
}

impl Gen4Driver {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_move(&mut self, view: &BitView<'_>, now_ms: u64, out: &mut DriverOutput) {
        let serial = (view.bit_word_le(8, 16) & 0xFF) as u8;
        let cube_ts = view.bit_word_le(24, 32) as u64;
        let face_index = view.bit_word(56, 4) as usize;
        let direction = Direction::from_bit(view.bit_word(60, 1));
        let Some(face) = Face::from_index(face_index) else {
            tracing::debug!(face_index, "gen4 move with unknown face dropped");
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

    fn handle_history(&mut self, view: &BitView<'_>, out: &mut DriverOutput) {
        let count = view.bit_word(8, 8);
        let start = view.bit_word(16, 8) as u8;
        for i in 0..count as usize {
            let code = view.bit_word(24 + 4 * i, 3);
            let Some(face) = HISTORY_FACE_CODES
                .iter()
                .position(|&c| c == code)
                .and_then(Face::from_index)
            else {
                continue;
            };
            let direction = Direction::from_bit(view.bit_word(27 + 4 * i, 1));
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
        let serial = (view.bit_word_le(8, 16) & 0xFF) as u8;

        let mut cp = [0u8; 7];
        let mut co = [0u8; 7];
        let mut ep = [0u8; 11];
        let mut eo = [0u8; 11];
        for i in 0..7 {
            cp[i] = view.bit_word(24 + 3 * i, 3) as u8;
            co[i] = view.bit_word(45 + 2 * i, 2) as u8;
        }
        for i in 0..11 {
            ep[i] = view.bit_word(59 + 4 * i, 4) as u8;
            eo[i] = view.bit_word(103 + i, 1) as u8;
        }
        let state = CubeState::from_wire(cp, co, ep, eo);

        out.events.push(DeviceEvent::Facelets(FaceletsEvent {
            serial,
            facelets: state.to_facelets(),
            state,
        }));
        self.reconciler.observe_facelets(serial, now_ms, out);
    }

    fn handle_gyro(&self, view: &BitView<'_>, out: &mut DriverOutput) {
        let quaternion = Quaternion {
            w: sign_magnitude_16(view.bit_word(8, 16)),
            x: sign_magnitude_16(view.bit_word(24, 16)),
            y: sign_magnitude_16(view.bit_word(40, 16)),
            z: sign_magnitude_16(view.bit_word(56, 16)),
        };
        let velocity = AngularVelocity {
            x: sign_magnitude_4(view.bit_word(72, 4)),
            y: sign_magnitude_4(view.bit_word(76, 4)),
            z: sign_magnitude_4(view.bit_word(80, 4)),
        };
        out.events.push(DeviceEvent::Gyro(GyroEvent {
            quaternion,
            velocity: Some(velocity),
        }));
    }

    fn handle_hardware_part(&mut self, tag: u32, view: &BitView<'_>, out: &mut DriverOutput) {
        match tag {
            EVENT_HW_DATE => {
                let year = view.bit_word_le(8, 16);
                let month = view.bit_word(24, 8);
                let day = view.bit_word(32, 8);
                self.hw_info.date = Some(format!("{year:04}-{month:02}-{day:02}"));
            }
            EVENT_HW_NAME => {
                let name: String = (0..8)
                    .map(|i| view.bit_word(8 + 8 * i, 8) as u8)
                    .take_while(|&b| b != 0)
                    .map(char::from)
                    .collect();
                self.hw_info.name = Some(name);
            }
            EVENT_HW_SOFTWARE => {
                self.hw_info.software =
                    Some(format!("{}.{}", view.bit_word(8, 8), view.bit_word(16, 8)));
            }
            EVENT_HW_HARDWARE => {
                self.hw_info.hardware =
                    Some(format!("{}.{}", view.bit_word(8, 8), view.bit_word(16, 8)));
            }
            _ => unreachable!("caller dispatches hardware tags only"),
        }
        if let Some(event) = self.hw_info.complete() {
            self.hw_info = PartialHardware::default();
            out.events.push(DeviceEvent::Hardware(event));
        }
    }
}

impl Driver for Gen4Driver {
    fn encode_command(&self, command: &Command) -> Option<Vec<u8>> {
        let mut frame = vec![0u8; COMMAND_LEN];
        match command {
            // Requests name the response event they expect.
            Command::RequestFacelets => {
                frame[..4].copy_from_slice(&[0xDD, 0x04, 0x00, 0xED]);
            }
            Command::RequestBattery => {
                frame[..4].copy_from_slice(&[0xDD, 0x04, 0x00, 0xEF]);
            }
            Command::RequestHardware => {
                frame[..2].copy_from_slice(&[0xDF, 0x03]);
            }
            Command::RequestReset => {
                frame[..3].copy_from_slice(&[0xD2, 0x0D, 0x05]);
                frame[3..15].copy_from_slice(&RESET_PAYLOAD);
            }
            Command::RequestMoveHistory { serial, count } => {
                frame[..2].copy_from_slice(&[0xD1, 0x04]);
                frame[2] = *serial;
                frame[4] = *count;
            }
        }
        Some(frame)
    }

    fn handle_state(&mut self, frame: &[u8], now_ms: u64) -> DriverOutput {
        let mut out = DriverOutput::default();
        let view = BitView::new(frame);
        if view.is_empty() {
            return out;
        }
        match view.bit_word(0, 8) {
            EVENT_MOVE => self.handle_move(&view, now_ms, &mut out),
            EVENT_HISTORY => self.handle_history(&view, &mut out),
            EVENT_FACELETS => self.handle_facelets(&view, now_ms, &mut out),
            EVENT_GYRO => self.handle_gyro(&view, &mut out),
            EVENT_BATTERY => {
                let percent = view.bit_word(8, 8).min(100) as u8;
                out.events.push(DeviceEvent::Battery(BatteryEvent { percent }));
            }
            EVENT_DISCONNECT => out.disconnect = true,
            tag @ (EVENT_HW_DATE | EVENT_HW_NAME | EVENT_HW_SOFTWARE | EVENT_HW_HARDWARE) => {
                self.handle_hardware_part(tag, &view, &mut out)
            }
            other => {
                tracing::debug!(event = other, "gen4 frame with unknown event type dropped");
            }
        }
        out
    }
}
