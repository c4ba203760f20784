//! Operator console: a ~5 Hz status line on stdout.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::shared::SharedState;

const PRINT_PERIOD: Duration = Duration::from_millis(200);

/// Loop until the process exits, rewriting one status line in place.
pub fn run(shared: Arc<SharedState>) {
    println!("Release your transmitter kill switch");
    println!("Then move throttle DOWN-UP-DOWN to arm");

    let mut stdout = std::io::stdout();
    while !shared.exiting() {
        let s = &shared.state;
        let u = s.control_u_snapshot();
        print!(
            "\rroll {:5.2} pitch {:5.2} yaw {:5.2} | err R {:5.2} P {:5.2} Y {:5.2} | u {:4.2} {:5.2} {:5.2} {:5.2} ",
            s.roll.load(),
            s.pitch.load(),
            s.yaw.load(),
            s.droll_err.load(),
            s.dpitch_err.load(),
            s.yaw_err.load(),
            u[0],
            u[1],
            u[2],
            u[3],
        );
        let _ = stdout.flush();
        std::thread::sleep(PRINT_PERIOD);
    }
    println!();
}
