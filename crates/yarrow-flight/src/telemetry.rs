//! MAVLink telemetry: heartbeat and attitude at ~10 Hz.
//!
//! Wire serialization belongs to the `mavlink` crate; this module only packs
//! the current shared state into messages and pushes the bytes at whatever
//! sink the process was started with (UDP towards the ground station in
//! practice).

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mavlink::common::{
    MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, ATTITUDE_DATA, HEARTBEAT_DATA,
};
use mavlink::{MavHeader, MavlinkVersion};

use crate::drivers::TelemetrySink;
use crate::shared::SharedState;

/// Ground station endpoint used when `-m` is given without an address.
pub const DEFAULT_GROUND_ADDR: &str = "127.0.0.1:14550";

const TELEMETRY_PERIOD: Duration = Duration::from_millis(100);

const SYSTEM_ID: u8 = 1;
const COMPONENT_ID: u8 = 200;

pub struct TelemetrySender {
    shared: Arc<SharedState>,
    sink: Arc<dyn TelemetrySink>,
    started: Instant,
    sequence: u8,
}

impl TelemetrySender {
    pub fn new(shared: Arc<SharedState>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            shared,
            sink,
            started: Instant::now(),
            sequence: 0,
        }
    }

    /// Send one heartbeat + attitude pair.
    pub fn send_once(&mut self) -> io::Result<()> {
        let heartbeat = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_GENERIC,
            base_mode: if self.shared.armed() {
                MavModeFlag::MAV_MODE_FLAG_GUIDED_ENABLED | MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED
            } else {
                MavModeFlag::MAV_MODE_FLAG_GUIDED_ENABLED
            },
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        });
        self.send_message(&heartbeat)?;

        let state = &self.shared.state;
        let attitude = MavMessage::ATTITUDE(ATTITUDE_DATA {
            time_boot_ms: self.started.elapsed().as_millis() as u32,
            roll: state.roll.load(),
            pitch: state.pitch.load(),
            yaw: state.yaw.load(),
            rollspeed: state.droll.load(),
            pitchspeed: state.dpitch.load(),
            yawspeed: state.dyaw.load(),
        });
        self.send_message(&attitude)
    }

    fn send_message(&mut self, message: &MavMessage) -> io::Result<()> {
        let header = MavHeader {
            system_id: SYSTEM_ID,
            component_id: COMPONENT_ID,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let mut frame = Vec::with_capacity(64);
        mavlink::write_versioned_msg(&mut frame, MavlinkVersion::V2, header, message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.sink.send(&frame)
    }

    /// Loop until the process exits; send failures are logged, not fatal.
    pub fn run(&mut self) {
        while !self.shared.exiting() {
            if let Err(e) = self.send_once() {
                log::warn!("telemetry send failed: {e}");
            }
            std::thread::sleep(TELEMETRY_PERIOD);
        }
    }
}

/// UDP implementation of the telemetry sink contract.
pub struct UdpTelemetrySink {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpTelemetrySink {
    pub fn new(destination: impl ToSocketAddrs) -> io::Result<Self> {
        let destination = destination
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no ground address"))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            destination,
        })
    }
}

impl TelemetrySink for UdpTelemetrySink {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        self.socket.send_to(frame, self.destination).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CapturingSink {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    impl TelemetrySink for CapturingSink {
        fn send(&self, frame: &[u8]) -> io::Result<()> {
            self.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_heartbeat_and_attitude_frames() {
        let shared = Arc::new(SharedState::default());
        shared.state.roll.store(0.1);
        let sink = Arc::new(CapturingSink {
            frames: Mutex::new(Vec::new()),
        });
        let mut sender = TelemetrySender::new(shared, sink.clone());

        sender.send_once().unwrap();
        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        for frame in frames.iter() {
            // MAVLink v2 magic byte.
            assert_eq!(frame[0], 0xFD);
        }
        // Sequence numbers advance across messages.
        assert_eq!(frames[0][4], 0);
        assert_eq!(frames[1][4], 1);
    }
}
