// Property-style coverage for the move reconciler: whatever subset of
// interior moves the radio drops, the emitted serial sequence is exactly
// the ascending run once history responses arrive.

use gancube_core::event::{Command, DeviceEvent, Direction, Face, MoveEvent};
use gancube_core::protocol::{DriverOutput, MoveReconciler};

fn mv(serial: u8, realtime: bool) -> MoveEvent {
    MoveEvent {
        face: Face::Up,
        direction: Direction::Clockwise,
        serial,
        host_ts: realtime.then_some(1_000),
        cube_ts: realtime.then_some(2_000),
    }
}

fn emitted(out: &DriverOutput) -> Vec<u8> {
    out.events
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::Move(m) => Some(m.serial),
            _ => None,
        })
        .collect()
}

// Serve a history request the way the firmware does: `count` moves
// starting at `serial`, counting downward, newest first.
fn serve_history(reconciler: &mut MoveReconciler, serial: u8, count: u8) -> Vec<u8> {
    let mut out = DriverOutput::default();
    for i in 0..count {
        reconciler.inject_history(mv(serial.wrapping_sub(i), false), &mut out);
    }
    emitted(&out)
}

#[test]
fn every_interior_drop_pattern_recovers_in_order() {
    // Runs of 8 moves after the seed; every subset of the 6 interior
    // serials may be dropped (the final move must arrive to trigger
    // recovery).
    const BASE: u8 = 250; // crosses the serial wrap for free
    const RUN: u8 = 8;

    for mask in 0u32..(1 << 6) {
        let lost =
            |serial: u8| -> bool { (1..=6).any(|i| mask >> (i - 1) & 1 == 1 && serial == BASE.wrapping_add(i)) };

        let mut reconciler = MoveReconciler::new();
        let mut out = DriverOutput::default();
        reconciler.observe_facelets(BASE, 0, &mut out);

        let mut delivered = Vec::new();
        for i in 1..=RUN {
            let serial = BASE.wrapping_add(i);
            if lost(serial) {
                continue;
            }
            let mut out = DriverOutput::default();
            reconciler.push_realtime(mv(serial, true), 1_000, &mut out);
            delivered.extend(emitted(&out));
            for command in out.commands {
                let Command::RequestMoveHistory { serial, count } = command else {
                    panic!("unexpected command {command:?}");
                };
                delivered.extend(serve_history(&mut reconciler, serial, count));
            }
        }

        let expected: Vec<u8> = (1..=RUN).map(|i| BASE.wrapping_add(i)).collect();
        assert_eq!(delivered, expected, "drop mask {mask:06b}");
        assert_eq!(reconciler.pending(), 0, "drop mask {mask:06b}");
    }
}

#[test]
fn redundant_history_responses_do_not_duplicate_moves() {
    let mut reconciler = MoveReconciler::new();
    let mut out = DriverOutput::default();
    reconciler.observe_facelets(10, 0, &mut out);

    let mut delivered = Vec::new();
    let mut out = DriverOutput::default();
    reconciler.push_realtime(mv(11, true), 1_000, &mut out);
    reconciler.push_realtime(mv(14, true), 1_100, &mut out);
    delivered.extend(emitted(&out));

    // The same response arrives twice (requests were re-issued).
    delivered.extend(serve_history(&mut reconciler, 13, 2));
    delivered.extend(serve_history(&mut reconciler, 13, 2));

    assert_eq!(delivered, vec![11, 12, 13, 14]);
}
