//! Per-tick flight log: a bounded queue between the control tick and a CSV
//! writer thread.
//!
//! The producer side is the control tick, which must never block; it uses
//! `try_send` and counts (rather than waits out) overflow. The consumer
//! drains to disk at its leisure and flushes on shutdown, when the sender
//! half is dropped with the core.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;

/// Ticks of headroom between a stalled writer and dropped records; at 200 Hz
/// this is about 20 seconds.
const LOG_QUEUE_DEPTH: usize = 4096;

/// One fixed-column row per control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    pub num_loops: u64,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub droll: f32,
    pub dpitch: f32,
    pub dyaw: f32,
    pub u: [f32; 4],
    pub esc: [f32; 4],
    pub v_batt: f32,
}

const HEADER: [&str; 16] = [
    "num_loops", "roll", "pitch", "yaw", "droll", "dpitch", "dyaw", "u_0", "u_1", "u_2", "u_3",
    "esc_1", "esc_2", "esc_3", "esc_4", "v_batt",
];

/// Producer half held by the flight core.
pub struct LogSender {
    tx: SyncSender<LogRecord>,
    dropped: AtomicU64,
}

impl LogSender {
    /// Enqueue one record without ever blocking. Overflow and writer death
    /// both just count as drops; the control loop does not care.
    pub fn push(&self, record: LogRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create the bounded producer/consumer pair.
pub fn log_channel() -> (LogSender, Receiver<LogRecord>) {
    let (tx, rx) = std::sync::mpsc::sync_channel(LOG_QUEUE_DEPTH);
    (
        LogSender {
            tx,
            dropped: AtomicU64::new(0),
        },
        rx,
    )
}

/// Spawn the writer thread draining `rx` into a CSV file at `path`.
///
/// Returns an error only if the file can't be opened; the caller warns and
/// flies without a log. The thread exits once every sender is gone and the
/// queue is drained, flushing on the way out.
pub fn spawn_writer(path: &Path, rx: Receiver<LogRecord>) -> anyhow::Result<JoinHandle<()>> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADER)?;

    let handle = std::thread::Builder::new()
        .name("log-writer".into())
        .spawn(move || {
            for record in rx.iter() {
                if let Err(e) = write_row(&mut writer, &record) {
                    log::warn!("flight log write failed: {e}");
                    break;
                }
            }
            if let Err(e) = writer.flush() {
                log::warn!("flight log flush failed: {e}");
            }
        })?;
    Ok(handle)
}

fn write_row(writer: &mut csv::Writer<std::fs::File>, r: &LogRecord) -> csv::Result<()> {
    writer.write_record(&[
        r.num_loops.to_string(),
        format!("{:.4}", r.roll),
        format!("{:.4}", r.pitch),
        format!("{:.4}", r.yaw),
        format!("{:.4}", r.droll),
        format!("{:.4}", r.dpitch),
        format!("{:.4}", r.dyaw),
        format!("{:.4}", r.u[0]),
        format!("{:.4}", r.u[1]),
        format!("{:.4}", r.u[2]),
        format!("{:.4}", r.u[3]),
        format!("{:.4}", r.esc[0]),
        format!("{:.4}", r.esc[1]),
        format!("{:.4}", r.esc[2]),
        format!("{:.4}", r.esc[3]),
        format!("{:.2}", r.v_batt),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u64) -> LogRecord {
        LogRecord {
            num_loops: n,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            droll: 0.0,
            dpitch: 0.0,
            dyaw: 0.0,
            u: [0.0; 4],
            esc: [0.0; 4],
            v_batt: 11.1,
        }
    }

    #[test]
    fn test_push_never_blocks_on_overflow() {
        let (tx, _rx) = log_channel();
        for i in 0..(LOG_QUEUE_DEPTH as u64 + 100) {
            tx.push(record(i));
        }
        assert_eq!(tx.dropped(), 100);
    }

    #[test]
    fn test_records_arrive_in_order() {
        let (tx, rx) = log_channel();
        for i in 0..10 {
            tx.push(record(i));
        }
        drop(tx);
        let loops: Vec<u64> = rx.iter().map(|r| r.num_loops).collect();
        assert_eq!(loops, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_writer_produces_one_row_per_record() {
        let path = std::env::temp_dir().join(format!(
            "yarrow_log_test_{}_{}.csv",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let (tx, rx) = log_channel();
        let handle = spawn_writer(&path, rx).unwrap();
        for i in 0..50 {
            tx.push(record(i));
        }
        drop(tx);
        handle.join().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 51); // header + 50 rows
        assert!(lines[0].starts_with("num_loops,roll"));
        assert!(lines[1].starts_with("0,"));
        std::fs::remove_file(&path).ok();
    }
}
