//! Simulated radio, LEDs and pause button.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use yarrow_flight::{LedDriver, PauseButton, RadioDriver};

/// A radio whose frames are pushed by the test or a script thread.
#[derive(Default)]
pub struct SimRadio {
    queue: Mutex<VecDeque<[f32; 6]>>,
    latest: Mutex<[f32; 6]>,
}

impl SimRadio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver one frame of six normalized channels.
    pub fn push_frame(&self, channels: [f32; 6]) {
        self.queue.lock().unwrap().push_back(channels);
    }
}

impl RadioDriver for SimRadio {
    fn has_new_frame(&self) -> bool {
        match self.queue.lock().unwrap().pop_front() {
            Some(frame) => {
                *self.latest.lock().unwrap() = frame;
                true
            }
            None => false,
        }
    }

    fn channel_normalized(&self, channel: u8) -> f32 {
        self.latest.lock().unwrap()[channel as usize - 1]
    }
}

/// One timed frame of a scripted transmission.
#[derive(Debug, Clone, Copy)]
pub struct ScriptFrame {
    pub at: Duration,
    pub channels: [f32; 6],
}

/// Feed a script of timed frames into `radio` from a background thread.
/// The thread ends with the script; anything after that is loss of link.
pub fn spawn_script(radio: Arc<SimRadio>, script: Vec<ScriptFrame>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let started = std::time::Instant::now();
        for frame in script {
            if let Some(wait) = frame.at.checked_sub(started.elapsed()) {
                std::thread::sleep(wait);
            }
            radio.push_frame(frame.channels);
        }
    })
}

/// LEDs that just remember their state.
#[derive(Default)]
pub struct SimLeds {
    red: AtomicBool,
    green: AtomicBool,
}

impl SimLeds {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn red(&self) -> bool {
        self.red.load(Ordering::SeqCst)
    }

    pub fn green(&self) -> bool {
        self.green.load(Ordering::SeqCst)
    }
}

impl LedDriver for SimLeds {
    fn set_red(&self, on: bool) {
        self.red.store(on, Ordering::SeqCst);
    }

    fn set_green(&self, on: bool) {
        self.green.store(on, Ordering::SeqCst);
    }
}

/// A pause button driven from a test or script.
#[derive(Default)]
pub struct SimButton {
    down: AtomicBool,
}

impl SimButton {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_pressed(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

impl PauseButton for SimButton {
    fn pressed(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_consumed_once() {
        let radio = SimRadio::new();
        radio.push_frame([0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);

        assert!(radio.has_new_frame());
        assert!(!radio.has_new_frame());
        assert_eq!(radio.channel_normalized(1), 0.1);
        assert_eq!(radio.channel_normalized(6), 0.6);
    }

    #[test]
    fn test_latest_frame_sticks() {
        let radio = SimRadio::new();
        radio.push_frame([1.0; 6]);
        radio.push_frame([-1.0; 6]);

        assert!(radio.has_new_frame());
        assert_eq!(radio.channel_normalized(3), 1.0);
        assert!(radio.has_new_frame());
        assert_eq!(radio.channel_normalized(3), -1.0);
    }
}
