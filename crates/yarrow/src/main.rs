//! Yarrow - quadrotor autopilot, flying its simulated vehicle.
//!
//! Wires the simulated drivers into the flight fabric, feeds the scripted
//! demo transmission, and shuts down through the pause button once the
//! flight is over. Exit code 0 on a clean shutdown, non-zero if any piece
//! of initialization fails.

mod cli;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yarrow_flight::telemetry::UdpTelemetrySink;
use yarrow_flight::{Drivers, Options, TelemetrySink};
use yarrow_sim::{spawn_script, SimButton, SimParams, SimRadio, SimVehicle};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = cli::Args::parse();

    // The simulated vehicle answers both the IMU and actuator contracts,
    // pacing the control loop at the real 200 Hz.
    let vehicle = Arc::new(SimVehicle::new(SimParams {
        sample_period: Duration::from_millis(5),
        ..Default::default()
    }));
    let radio = SimRadio::new();
    let leds = yarrow_sim::SimLeds::new();
    let button = SimButton::new();

    let log_path = if args.logging {
        std::fs::create_dir_all(&args.log_dir)
            .with_context(|| format!("creating log dir {}", args.log_dir.display()))?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Some(args.log_dir.join(format!("flight_{stamp}.csv")))
    } else {
        None
    };

    let telemetry: Option<Arc<dyn TelemetrySink>> = match &args.mavlink {
        Some(ip) => {
            let sink = UdpTelemetrySink::new(format!("{ip}:14550"))
                .with_context(|| format!("opening telemetry socket towards {ip}"))?;
            println!("sending mavlink telemetry to {ip}:14550");
            Some(Arc::new(sink))
        }
        None => None,
    };

    let process = yarrow_flight::start(
        Drivers {
            imu: vehicle.clone(),
            actuator: vehicle.clone(),
            radio: radio.clone(),
            leds,
            button: button.clone(),
        },
        Options {
            log_path,
            quiet: args.quiet,
            telemetry,
            config_path: Some(args.config.clone()),
        },
    )
    .context("starting flight fabric")?;

    // Fly the scripted demo, then hold the pause button to exit cleanly.
    let transmitter = spawn_script(radio, cli::demo_script(args.hover_secs));
    let _ = transmitter.join();
    std::thread::sleep(Duration::from_secs(1));
    button.set_pressed(true);

    process.wait();
    process.shutdown();
    Ok(())
}
