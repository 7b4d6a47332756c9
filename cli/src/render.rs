// Human-readable event rendering.

use colored::*;
use gancube_core::event::DeviceEvent;

pub fn print_event(index: usize, event: &DeviceEvent) {
    match event {
        DeviceEvent::Move(mv) => {
            let timing = match (mv.host_ts, mv.cube_ts) {
                (Some(host), Some(cube)) => format!("host {host} ms, cube {cube} ms"),
                (None, None) => "recovered from history".to_string(),
                (host, cube) => format!("host {host:?}, cube {cube:?}"),
            };
            println!(
                "{index:>4}  {} {:<3} serial {:>3}  ({timing})",
                "move".green().bold(),
                mv.notation(),
                mv.serial,
            );
        }
        DeviceEvent::Facelets(facelets) => {
            let validity = match facelets.state.validate() {
                Ok(()) => "ok".normal(),
                Err(defect) => format!("invalid: {defect:?}").red(),
            };
            println!(
                "{index:>4}  {} serial {:>3}  {}  [{validity}]",
                "state".blue().bold(),
                facelets.serial,
                facelets.facelets,
            );
        }
        DeviceEvent::Gyro(gyro) => {
            let q = gyro.quaternion;
            println!(
                "{index:>4}  {}  x {:+.3} y {:+.3} z {:+.3} w {:+.3}",
                "gyro".cyan(),
                q.x,
                q.y,
                q.z,
                q.w,
            );
        }
        DeviceEvent::Hardware(hw) => {
            println!(
                "{index:>4}  {}  {} hw {} sw {}{}{}",
                "hardware".yellow().bold(),
                hw.name,
                hw.hardware_version,
                hw.software_version,
                hw.production_date
                    .as_deref()
                    .map(|d| format!(" made {d}"))
                    .unwrap_or_default(),
                if hw.gyro_supported { " (gyro)" } else { "" },
            );
        }
        DeviceEvent::Battery(battery) => {
            println!("{index:>4}  {}  {}%", "battery".yellow(), battery.percent);
        }
        DeviceEvent::Timer(timer) => {
            let time = timer
                .recorded_time
                .map(|t| format!("  {} ({} ms)", t, t.as_timestamp()))
                .unwrap_or_default();
            println!(
                "{index:>4}  {}  {:?}{time}",
                "timer".magenta().bold(),
                timer.state,
            );
        }
        DeviceEvent::Disconnect => {
            println!("{index:>4}  {}", "disconnect".red().bold());
        }
    }
}
