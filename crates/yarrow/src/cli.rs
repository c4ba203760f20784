//! Command line surface and the scripted demo flight.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use yarrow_sim::ScriptFrame;

#[derive(Parser, Debug)]
#[command(name = "yarrow")]
#[command(about = "Quadrotor autopilot flying a simulated vehicle")]
#[command(version)]
pub struct Args {
    /// Save a CSV flight log for this session
    #[arg(short = 'l', long = "logging")]
    pub logging: bool,

    /// Quiet mode: suppress the operator status line
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Send MAVLink telemetry, optionally to a ground-station IP
    #[arg(
        short = 'm',
        long = "mavlink",
        value_name = "GROUND_IP",
        num_args = 0..=1,
        default_missing_value = "127.0.0.1"
    )]
    pub mavlink: Option<String>,

    /// Controller configuration file (created with defaults if missing)
    #[arg(long, default_value = "yarrow_config.json")]
    pub config: PathBuf,

    /// Directory for flight log files
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Hover time of the scripted demo flight, seconds
    #[arg(long, default_value_t = 6.0)]
    pub hover_secs: f32,
}

/// Frame cadence of the simulated transmitter.
const FRAME_PERIOD: Duration = Duration::from_millis(20);

/// Build the demo transmission: release the kill switch, fly the arming
/// gesture, hover, then bring the throttle back down. The script ending is
/// the loss of link.
pub fn demo_script(hover_secs: f32) -> Vec<ScriptFrame> {
    let mut script = Vec::new();
    let mut at = Duration::ZERO;

    // channels: [throttle, roll, pitch, yaw, kill (released > 0), mode]
    let mut segment = |seconds: f32, channels: [f32; 6], script: &mut Vec<ScriptFrame>| {
        let frames = (seconds / FRAME_PERIOD.as_secs_f32()).ceil() as u32;
        for _ in 0..frames {
            script.push(ScriptFrame { at, channels });
            at += FRAME_PERIOD;
        }
    };

    // Arming gesture: throttle down, up, down.
    segment(1.0, [-1.0, 0.0, 0.0, 0.0, 1.0, 1.0], &mut script);
    segment(0.5, [1.0, 0.0, 0.0, 0.0, 1.0, 1.0], &mut script);
    segment(0.7, [-1.0, 0.0, 0.0, 0.0, 1.0, 1.0], &mut script);

    // Hover with a brief roll nudge in the middle.
    let hover = hover_secs.max(2.0);
    segment(hover / 2.0, [0.1, 0.0, 0.0, 0.0, 1.0, 1.0], &mut script);
    segment(0.5, [0.1, 0.3, 0.0, 0.0, 1.0, 1.0], &mut script);
    segment(hover / 2.0, [0.1, 0.0, 0.0, 0.0, 1.0, 1.0], &mut script);

    // Throttle down to land.
    segment(1.0, [-1.0, 0.0, 0.0, 0.0, 1.0, 1.0], &mut script);

    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_flags() {
        let args = Args::parse_from(["yarrow", "-l", "-q", "-m", "10.0.0.7"]);
        assert!(args.logging);
        assert!(args.quiet);
        assert_eq!(args.mavlink.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn test_mavlink_flag_without_address() {
        let args = Args::parse_from(["yarrow", "-m"]);
        assert_eq!(args.mavlink.as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["yarrow"]);
        assert!(!args.logging);
        assert!(!args.quiet);
        assert!(args.mavlink.is_none());
    }

    #[test]
    fn test_demo_script_is_ordered() {
        let script = demo_script(6.0);
        assert!(!script.is_empty());
        for pair in script.windows(2) {
            assert!(pair[0].at <= pair[1].at);
        }
        // The gesture starts with throttle held down.
        assert_eq!(script[0].channels[0], -1.0);
        // And the kill switch stays released throughout.
        assert!(script.iter().all(|f| f.channels[4] > 0.0));
    }
}
