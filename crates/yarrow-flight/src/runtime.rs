//! Process assembly: spawn the fabric, park, shut down in order.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use yarrow_core::CoreConfig;

use crate::config_store;
use crate::core::FlightCore;
use crate::drivers::{ActuatorDriver, ImuDriver, LedDriver, PauseButton, RadioDriver, TelemetrySink};
use crate::flight_log;
use crate::indicator;
use crate::link::LinkWatcher;
use crate::printer;
use crate::safety;
use crate::shared::{ProcessState, SharedState};
use crate::stack::FlightStack;
use crate::telemetry::TelemetrySender;

/// The full set of device contracts the process flies with.
pub struct Drivers {
    pub imu: Arc<dyn ImuDriver>,
    pub actuator: Arc<dyn ActuatorDriver>,
    pub radio: Arc<dyn RadioDriver>,
    pub leds: Arc<dyn LedDriver>,
    pub button: Arc<dyn PauseButton>,
}

/// Feature switches from the command line.
#[derive(Default)]
pub struct Options {
    /// Write a per-flight CSV log here.
    pub log_path: Option<PathBuf>,
    /// Suppress the operator printer.
    pub quiet: bool,
    /// Send MAVLink telemetry at this sink.
    pub telemetry: Option<Arc<dyn TelemetrySink>>,
    /// Persisted configuration; reloaded on every arm. Built-in defaults
    /// when absent.
    pub config_path: Option<PathBuf>,
}

/// A running autopilot process.
pub struct FlightProcess {
    pub shared: Arc<SharedState>,
    imu: Arc<dyn ImuDriver>,
    threads: Vec<JoinHandle<()>>,
}

/// Bring the whole fabric up. Fails only on thread-spawn errors; a missing
/// config or an unopenable log degrade with a warning instead.
pub fn start(drivers: Drivers, options: Options) -> anyhow::Result<FlightProcess> {
    let shared = Arc::new(SharedState::default());

    // Always start disarmed.
    shared.disarm();

    let config = match &options.config_path {
        Some(path) => config_store::load_or_default(path),
        None => CoreConfig::default(),
    };

    let mut threads = Vec::new();

    // Flight log writer; fly without it if the file won't open.
    let log_sender = match &options.log_path {
        Some(path) => {
            let (tx, rx) = flight_log::log_channel();
            match flight_log::spawn_writer(path, rx) {
                Ok(handle) => {
                    threads.push(handle);
                    Some(tx)
                }
                Err(e) => {
                    log::warn!("failed to open flight log: {e:#}");
                    None
                }
            }
        }
        None => None,
    };

    // The hard-real-time path: flight core driven by the IMU sample clock.
    let mut core = FlightCore::new(
        shared.clone(),
        drivers.actuator.clone(),
        log_sender,
        config,
    );
    let imu = drivers.imu.clone();
    threads.push(
        std::thread::Builder::new()
            .name("flight-core".into())
            .spawn(move || core.run(imu.as_ref()))?,
    );

    // Flight stack with its arming supervisor.
    let reload_config: Box<dyn Fn() -> CoreConfig + Send> = match options.config_path.clone() {
        Some(path) => Box::new(move || config_store::load_or_default(&path)),
        None => Box::new(CoreConfig::default),
    };
    let mut stack = FlightStack::new(
        shared.clone(),
        drivers.actuator.clone(),
        config,
        reload_config,
    );
    threads.push(
        std::thread::Builder::new()
            .name("flight-stack".into())
            .spawn(move || stack.run())?,
    );

    // Safety supervisor.
    {
        let shared = shared.clone();
        threads.push(
            std::thread::Builder::new()
                .name("safety".into())
                .spawn(move || safety::run(shared))?,
        );
    }

    // Link watcher.
    {
        let shared = shared.clone();
        let radio = drivers.radio.clone();
        threads.push(
            std::thread::Builder::new()
                .name("link-watcher".into())
                .spawn(move || LinkWatcher::new().run(radio, shared))?,
        );
    }

    // Indicator LEDs and pause button.
    {
        let shared = shared.clone();
        let leds = drivers.leds.clone();
        threads.push(
            std::thread::Builder::new()
                .name("indicator".into())
                .spawn(move || indicator::run_leds(shared, leds))?,
        );
    }
    {
        let shared = shared.clone();
        let button = drivers.button.clone();
        threads.push(
            std::thread::Builder::new()
                .name("pause-button".into())
                .spawn(move || indicator::run_button(shared, button))?,
        );
    }

    // MAVLink telemetry, if enabled.
    if let Some(sink) = options.telemetry.clone() {
        let mut sender = TelemetrySender::new(shared.clone(), sink);
        threads.push(
            std::thread::Builder::new()
                .name("telemetry".into())
                .spawn(move || sender.run())?,
        );
    }

    // Operator printer, unless quiet.
    if !options.quiet {
        let shared = shared.clone();
        threads.push(
            std::thread::Builder::new()
                .name("printer".into())
                .spawn(move || printer::run(shared))?,
        );
    }

    Ok(FlightProcess {
        shared,
        imu: drivers.imu,
        threads,
    })
}

impl FlightProcess {
    /// Park until something moves the process to EXITING.
    pub fn wait(&self) {
        while !self.shared.exiting() {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    /// Orderly shutdown: disarm, stop the IMU clock, join every thread
    /// (the log writer flushes as its queue drains shut).
    pub fn shutdown(mut self) {
        self.shared.disarm();
        self.shared.set_process(ProcessState::Exiting);
        self.imu.stop();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}
