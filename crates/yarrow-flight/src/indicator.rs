//! Status LEDs and the pause button.
//!
//! Red flashes at 1 Hz while disarmed, green is solid while armed. The pause
//! button disarms on a short press and exits the process when held for a
//! second.

use std::sync::Arc;
use std::time::Duration;

use crate::drivers::{LedDriver, PauseButton};
use crate::shared::{CoreMode, ProcessState, SharedState};

const LED_HALF_PERIOD: Duration = Duration::from_millis(500);
const BUTTON_POLL: Duration = Duration::from_millis(50);
const BUTTON_HOLD_POLLS: u32 = 10;
const BUTTON_HOLD_POLL: Duration = Duration::from_millis(100);

/// LED loop until the process exits; leaves both LEDs off on the way out.
pub fn run_leds(shared: Arc<SharedState>, leds: Arc<dyn LedDriver>) {
    let mut toggle = false;
    while !shared.exiting() {
        if shared.setpoint.mode() == CoreMode::Disarmed {
            toggle = !toggle;
            leds.set_green(false);
            leds.set_red(toggle);
        } else {
            toggle = false;
            leds.set_green(true);
            leds.set_red(false);
        }
        std::thread::sleep(LED_HALF_PERIOD);
    }
    leds.set_red(false);
    leds.set_green(false);
}

/// Button loop until the process exits.
pub fn run_button(shared: Arc<SharedState>, button: Arc<dyn PauseButton>) {
    while !shared.exiting() {
        if button.pressed() {
            // Momentary press disarms right away; keep watching to see if
            // it turns into a hold.
            shared.disarm();
            let mut polls = 0;
            while button.pressed() {
                std::thread::sleep(BUTTON_HOLD_POLL);
                polls += 1;
                if polls >= BUTTON_HOLD_POLLS {
                    log::info!("pause button held, exiting");
                    shared.set_process(ProcessState::Exiting);
                    return;
                }
            }
        }
        std::thread::sleep(BUTTON_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubButton {
        down: AtomicBool,
    }

    impl PauseButton for StubButton {
        fn pressed(&self) -> bool {
            self.down.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_short_press_disarms_only() {
        let shared = Arc::new(SharedState::default());
        shared.setpoint.arm(CoreMode::Attitude);
        let button = Arc::new(StubButton {
            down: AtomicBool::new(true),
        });

        let worker = {
            let shared = shared.clone();
            let button = button.clone();
            std::thread::spawn(move || run_button(shared, button))
        };

        // Release well before the hold threshold.
        std::thread::sleep(Duration::from_millis(300));
        button.down.store(false, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(shared.setpoint.mode(), CoreMode::Disarmed);
        assert_eq!(shared.process(), ProcessState::Running);

        shared.set_process(ProcessState::Exiting);
        worker.join().unwrap();
    }

    #[test]
    fn test_long_hold_exits() {
        let shared = Arc::new(SharedState::default());
        let button = Arc::new(StubButton {
            down: AtomicBool::new(true),
        });

        let worker = {
            let shared = shared.clone();
            std::thread::spawn(move || run_button(shared, button))
        };
        worker.join().unwrap();
        assert_eq!(shared.process(), ProcessState::Exiting);
    }
}
