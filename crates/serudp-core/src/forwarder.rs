//! The relay loop: one line in, at most one datagram out.

use log::{error, info};
use serialport::SerialPort;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{ForwarderConfig, SendPolicy};
use crate::error::Result;
use crate::serial::{LineSource, SerialReader};
use crate::udp::{DatagramSink, UdpSender};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub lines_forwarded: u64,
    pub bytes_sent: u64,
    pub blank_lines: u64,
    pub timeouts: u64,
    pub send_failures: u64,
}

impl fmt::Display for ForwardStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines forwarded ({} bytes), {} blank, {} timeouts, {} send failures",
            self.lines_forwarded,
            self.bytes_sent,
            self.blank_lines,
            self.timeouts,
            self.send_failures
        )
    }
}

/// Owns both ends of the relay. Consumed by [`Forwarder::run`], so the
/// serial handle and the socket are released on every way out of the loop.
pub struct Forwarder<S, D> {
    source: S,
    sink: D,
    send_policy: SendPolicy,
    stats: ForwardStats,
}

/// Opens the configured serial port and UDP socket.
pub fn open(
    cfg: &ForwarderConfig,
) -> Result<Forwarder<SerialReader<Box<dyn SerialPort>>, UdpSender>> {
    let source = SerialReader::open(&cfg.serial, cfg.decoder)?;
    let sink = UdpSender::new(cfg.destination)?;
    Ok(Forwarder::new(source, sink).with_send_policy(cfg.send_policy))
}

impl<S: LineSource, D: DatagramSink> Forwarder<S, D> {
    pub fn new(source: S, sink: D) -> Self {
        Self {
            source,
            sink,
            send_policy: SendPolicy::default(),
            stats: ForwardStats::default(),
        }
    }

    pub fn with_send_policy(mut self, policy: SendPolicy) -> Self {
        self.send_policy = policy;
        self
    }

    /// Relays lines until `running` is cleared or a fatal error occurs.
    ///
    /// The flag is only observed between reads; a read in progress always
    /// completes or times out first. The counters are logged on either exit.
    pub fn run(mut self, running: &AtomicBool) -> Result<ForwardStats> {
        while running.load(Ordering::SeqCst) {
            if let Err(e) = self.step() {
                error!("stopping after {}", self.stats);
                return Err(e);
            }
        }
        info!("{}", self.stats);
        Ok(self.stats)
    }

    fn step(&mut self) -> Result<()> {
        let line = match self.source.read_line()? {
            Some(line) => line,
            None => {
                self.stats.timeouts += 1;
                return Ok(());
            }
        };

        if line.is_empty() {
            self.stats.blank_lines += 1;
            return Ok(());
        }

        info!("[SERIAL] {line}");
        match self.sink.send(line.as_bytes()) {
            Ok(()) => {
                self.stats.lines_forwarded += 1;
                self.stats.bytes_sent += line.len() as u64;
            }
            Err(e) if self.send_policy == SendPolicy::Continue => {
                error!("dropped line: {e}");
                self.stats.send_failures += 1;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ForwardError, SerialError, UdpError};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;
    use std::sync::{Mutex, Once};

    /// Scripted line source. Clears the running flag once the script is
    /// exhausted, which stands in for an operator interrupt.
    struct FakeSource<'a> {
        script: VecDeque<std::result::Result<Option<String>, SerialError>>,
        running: &'a AtomicBool,
        reads: Rc<Cell<usize>>,
        dropped: Rc<Cell<bool>>,
    }

    impl LineSource for FakeSource<'_> {
        fn read_line(&mut self) -> std::result::Result<Option<String>, SerialError> {
            self.reads.set(self.reads.get() + 1);
            match self.script.pop_front() {
                Some(step) => step,
                None => {
                    self.running.store(false, Ordering::SeqCst);
                    Ok(None)
                }
            }
        }
    }

    impl Drop for FakeSource<'_> {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    #[derive(Default)]
    struct FakeSink {
        sent: Rc<RefCell<Vec<Vec<u8>>>>,
        fail_on: Option<usize>,
        attempts: usize,
        dropped: Rc<Cell<bool>>,
    }

    impl DatagramSink for FakeSink {
        fn send(&mut self, payload: &[u8]) -> std::result::Result<(), UdpError> {
            self.attempts += 1;
            if self.fail_on == Some(self.attempts) {
                return Err(UdpError::Send {
                    dest: "127.0.0.1:9".parse().unwrap(),
                    source: io::Error::new(io::ErrorKind::Other, "network unreachable"),
                });
            }
            self.sent.borrow_mut().push(payload.to_vec());
            Ok(())
        }
    }

    impl Drop for FakeSink {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    struct Harness<'a> {
        source: FakeSource<'a>,
        sink: FakeSink,
    }

    fn harness<'a>(
        running: &'a AtomicBool,
        script: Vec<std::result::Result<Option<&str>, SerialError>>,
    ) -> Harness<'a> {
        Harness {
            source: FakeSource {
                script: script
                    .into_iter()
                    .map(|s| s.map(|l| l.map(str::to_string)))
                    .collect(),
                running,
                reads: Rc::default(),
                dropped: Rc::default(),
            },
            sink: FakeSink::default(),
        }
    }

    #[test]
    fn forwards_non_empty_lines_in_order() {
        let running = AtomicBool::new(true);
        let h = harness(&running, vec![Ok(Some("TEMP=42")), Ok(Some("")), Ok(Some("TEMP=43"))]);
        let sent = h.sink.sent.clone();

        let stats = Forwarder::new(h.source, h.sink).run(&running).unwrap();

        assert_eq!(*sent.borrow(), vec![b"TEMP=42".to_vec(), b"TEMP=43".to_vec()]);
        assert_eq!(stats.lines_forwarded, 2);
        assert_eq!(stats.bytes_sent, 14);
        assert_eq!(stats.blank_lines, 1);
    }

    #[test]
    fn timeouts_send_nothing() {
        let running = AtomicBool::new(true);
        let h = harness(&running, vec![Ok(None), Ok(None)]);
        let sent = h.sink.sent.clone();

        let stats = Forwarder::new(h.source, h.sink).run(&running).unwrap();

        assert!(sent.borrow().is_empty());
        // two scripted timeouts plus the one that raised the interrupt
        assert_eq!(stats.timeouts, 3);
    }

    #[test]
    fn interrupt_releases_both_ends() {
        let running = AtomicBool::new(true);
        let h = harness(&running, vec![Ok(Some("a"))]);
        let (src_dropped, sink_dropped) = (h.source.dropped.clone(), h.sink.dropped.clone());

        assert!(Forwarder::new(h.source, h.sink).run(&running).is_ok());
        assert!(src_dropped.get());
        assert!(sink_dropped.get());
    }

    #[test]
    fn cleared_flag_skips_reading() {
        let running = AtomicBool::new(false);
        let h = harness(&running, vec![Ok(Some("never"))]);
        let reads = h.source.reads.clone();

        Forwarder::new(h.source, h.sink).run(&running).unwrap();
        assert_eq!(reads.get(), 0);
    }

    #[test]
    fn decode_error_stops_and_releases() {
        let running = AtomicBool::new(true);
        let bad = SerialError::Decode {
            valid_up_to: 0,
            bytes: vec![0xff],
        };
        let h = harness(&running, vec![Ok(Some("ok")), Err(bad), Ok(Some("after"))]);
        let sent = h.sink.sent.clone();
        let (src_dropped, sink_dropped) = (h.source.dropped.clone(), h.sink.dropped.clone());

        let err = Forwarder::new(h.source, h.sink).run(&running).unwrap_err();

        assert!(matches!(err, ForwardError::Serial(SerialError::Decode { .. })));
        assert_eq!(*sent.borrow(), vec![b"ok".to_vec()]);
        assert!(src_dropped.get());
        assert!(sink_dropped.get());
    }

    #[test]
    fn send_failure_is_fatal_by_default() {
        let running = AtomicBool::new(true);
        let mut h = harness(&running, vec![Ok(Some("one")), Ok(Some("two")), Ok(Some("three"))]);
        h.sink.fail_on = Some(2);
        let sent = h.sink.sent.clone();
        let reads = h.source.reads.clone();
        let (src_dropped, sink_dropped) = (h.source.dropped.clone(), h.sink.dropped.clone());

        let err = Forwarder::new(h.source, h.sink).run(&running).unwrap_err();

        assert!(matches!(err, ForwardError::Udp(UdpError::Send { .. })));
        assert_eq!(*sent.borrow(), vec![b"one".to_vec()]);
        assert_eq!(reads.get(), 2);
        assert!(src_dropped.get());
        assert!(sink_dropped.get());
    }

    /// Collects formatted records so tests can check what the operator sees.
    struct CaptureLogger;

    static CAPTURED: Mutex<Vec<String>> = Mutex::new(Vec::new());

    impl log::Log for CaptureLogger {
        fn enabled(&self, _: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            let line = format!("{} {}", record.level(), record.args());
            CAPTURED.lock().unwrap().push(line);
        }

        fn flush(&self) {}
    }

    fn capture_logs() {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            log::set_logger(&CaptureLogger).unwrap();
            log::set_max_level(log::LevelFilter::Trace);
        });
    }

    #[test]
    fn counters_are_logged_when_relay_fails() {
        capture_logs();
        let running = AtomicBool::new(true);
        let mut h = harness(&running, vec![Ok(Some("alpha-42")), Ok(Some("beta-42"))]);
        h.sink.fail_on = Some(2);

        assert!(Forwarder::new(h.source, h.sink).run(&running).is_err());

        let expected = "ERROR stopping after 1 lines forwarded (8 bytes), \
                        0 blank, 0 timeouts, 0 send failures";
        assert!(CAPTURED.lock().unwrap().iter().any(|l| l == expected));
    }

    #[test]
    fn send_failure_can_be_tolerated() {
        let running = AtomicBool::new(true);
        let mut h = harness(&running, vec![Ok(Some("one")), Ok(Some("two")), Ok(Some("three"))]);
        h.sink.fail_on = Some(2);
        let sent = h.sink.sent.clone();

        let stats = Forwarder::new(h.source, h.sink)
            .with_send_policy(SendPolicy::Continue)
            .run(&running)
            .unwrap();

        assert_eq!(*sent.borrow(), vec![b"one".to_vec(), b"three".to_vec()]);
        assert_eq!(stats.send_failures, 1);
        assert_eq!(stats.lines_forwarded, 2);
    }

    #[test]
    fn disconnect_is_fatal() {
        let running = AtomicBool::new(true);
        let h = harness(&running, vec![Err(SerialError::Disconnected)]);

        let err = Forwarder::new(h.source, h.sink).run(&running).unwrap_err();
        assert!(matches!(err, ForwardError::Serial(SerialError::Disconnected)));
    }

    #[test]
    fn stats_summary_reads_naturally() {
        let stats = ForwardStats {
            lines_forwarded: 2,
            bytes_sent: 14,
            blank_lines: 1,
            timeouts: 0,
            send_failures: 0,
        };
        assert_eq!(
            stats.to_string(),
            "2 lines forwarded (14 bytes), 1 blank, 0 timeouts, 0 send failures"
        );
    }
}
