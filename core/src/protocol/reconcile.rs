// Lost-move recovery shared by the Gen3 and Gen4 drivers.
//
// Moves carry an 8-bit wrapping serial. Notifications get dropped under
// BLE interference, so real-time moves are buffered and released only in
// contiguous serial order; gaps are filled through the move-history
// request/response sub-protocol. Gen2 recovers differently (each frame
// carries its own backlog) and does not use this.

use std::collections::VecDeque;

use crate::event::{Command, DeviceEvent, MoveEvent};
use crate::protocol::DriverOutput;

/// Pending moves past this count mean the gap is unrecoverable; the only
/// safe response is to drop the connection.
const MAX_PENDING_MOVES: usize = 16;

/// Quiet period after the last real-time move before a facelet snapshot
/// may trigger a catch-up history request.
const CATCH_UP_DEBOUNCE_MS: u64 = 500;

/// Serial-ordered move buffer with history-request scheduling.
#[derive(Debug, Default)]
pub struct MoveReconciler {
    buffer: VecDeque<MoveEvent>,
    /// Serial of the last move delivered downstream. `None` until the
    /// first facelet snapshot seeds it.
    last_serial: Option<u8>,
    /// Most recent serial observed on any carrier (move or facelets).
    current_serial: u8,
    /// Host timestamp of the last real-time move frame.
    last_local_ts: Option<u64>,
}

impl MoveReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_serial(&self) -> Option<u8> {
        self.last_serial
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a move decoded from a real-time move frame.
    pub fn push_realtime(&mut self, mv: MoveEvent, now_ms: u64, out: &mut DriverOutput) {
        self.last_local_ts = Some(now_ms);
        self.current_serial = mv.serial;
        self.buffer.push_back(mv);
        self.evict(true, out);
    }

    /// Feed a move delivered in a history-response frame.
    ///
    /// History arrives newest-first, so in-order responses prepend at the
    /// buffer head one serial at a time. Anything already buffered,
    /// already delivered, or outside the open gap is dropped — responses
    /// overlap when requests are re-issued.
    pub fn inject_history(&mut self, mv: MoveEvent, out: &mut DriverOutput) {
        if self.buffer.iter().any(|m| m.serial == mv.serial) {
            return;
        }
        let Some(last) = self.last_serial else {
            return;
        };
        match self.buffer.front() {
            Some(head) => {
                let gap = head.serial.wrapping_sub(last);
                let offset = mv.serial.wrapping_sub(last);
                if offset == 0 || offset >= gap {
                    return;
                }
                if mv.serial == head.serial.wrapping_sub(1) {
                    self.buffer.push_front(mv);
                }
            }
            None => {
                let span = self.current_serial.wrapping_sub(last);
                let offset = mv.serial.wrapping_sub(last);
                if offset == 0 || offset > span {
                    return;
                }
                self.buffer.push_front(mv);
            }
        }
        // Injection must not schedule another request: the remainder of
        // this response frame is usually about to fill the rest of the gap.
        self.evict(false, out);
    }

    /// Note a facelet snapshot. Seeds `last_serial` on first sight and,
    /// after a quiet period, schedules a catch-up request for moves the
    /// buffer never saw.
    pub fn observe_facelets(&mut self, serial: u8, now_ms: u64, out: &mut DriverOutput) {
        self.current_serial = serial;
        let Some(last) = self.last_serial else {
            self.last_serial = Some(serial);
            return;
        };
        let Some(local) = self.last_local_ts else {
            return;
        };
        if now_ms.saturating_sub(local) <= CATCH_UP_DEBOUNCE_MS {
            return;
        }
        let diff = serial.wrapping_sub(last);
        // serial == 0 after a gap is a firmware artifact, not a real
        // position; requesting history across it returns junk.
        if diff > 0 && serial != 0 {
            let from = self
                .buffer
                .front()
                .map(|m| m.serial)
                .unwrap_or_else(|| serial.wrapping_add(1));
            self.schedule_history(from, diff as u16 + 1, out);
        }
    }

    fn evict(&mut self, may_request: bool, out: &mut DriverOutput) {
        loop {
            let Some(head) = self.buffer.front() else {
                break;
            };
            let diff = match self.last_serial {
                Some(last) => head.serial.wrapping_sub(last),
                None => 1,
            };
            match diff {
                0 => {
                    // Duplicate of an already-delivered serial.
                    self.buffer.pop_front();
                }
                1 => {
                    if let Some(mv) = self.buffer.pop_front() {
                        self.last_serial = Some(mv.serial);
                        out.events.push(DeviceEvent::Move(mv));
                    }
                }
                gap => {
                    if may_request {
                        let serial = head.serial;
                        self.schedule_history(serial, gap as u16, out);
                    }
                    break;
                }
            }
        }
        if self.buffer.len() > MAX_PENDING_MOVES {
            tracing::warn!(
                pending = self.buffer.len(),
                "move buffer overflow, protocol desynchronized"
            );
            out.disconnect = true;
        }
    }

    fn schedule_history(&self, serial: u8, count: u16, out: &mut DriverOutput) {
        // The hardware only answers for odd starting serials, and only in
        // pairs of moves. The count travels in one byte; cap it below the
        // even-rounding so it cannot wrap to zero.
        let serial = if serial % 2 == 0 {
            serial.wrapping_sub(1)
        } else {
            serial
        };
        let mut count = count.min(254);
        if count % 2 == 1 {
            count += 1;
        }
        // A request reaching past serial zero hits a firmware bug that
        // fabricates D moves; clamp to the wrap boundary.
        let limit = serial as u16 + 1;
        if count > limit {
            count = limit;
        }
        out.commands.push(Command::RequestMoveHistory {
            serial,
            count: count as u8,
        });
    }
}
