use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use legato_core::ClockTempoEstimator;
use legato_midi::{ByteStreamDecoder, DecoderConfig, Realtime};
use parking_lot::Mutex;

use super::source::{ChannelSource, Packet};
use crate::dispatch::MessageSource;
use crate::error::Result;
use crate::event::TimedMessage;
use crate::port::{ListenerId, MidiIn};

type TimedRealtimeHandler = Box<dyn FnMut(Realtime, Duration) + Send>;

/// Ends a [`LiveReader`] from any thread.
#[derive(Clone)]
pub struct CloseHandle {
    input: Arc<dyn MidiIn>,
    listener: ListenerId,
    close: Sender<()>,
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle")
            .field("port", &self.input.info().name)
            .field("listener", &self.listener)
            .finish()
    }
}

impl CloseHandle {
    /// Detach from the port. A read blocked on the reader returns `Ok(None)`;
    /// bytes not yet decoded are dropped.
    pub fn close(&self) {
        if self.input.unlisten(self.listener) {
            tracing::debug!(port = %self.input.info().name, "live input closed");
        }
        let _ = self.close.try_send(());
    }
}

/// Decodes the byte stream of an input port.
///
/// Clock bytes are timestamped and fed to a shared
/// [`ClockTempoEstimator`]; Start, Continue and Stop restart its interval
/// buffer. Other realtime bytes only reach the handler set with
/// [`LiveReader::on_realtime`].
pub struct LiveReader {
    decoder: ByteStreamDecoder<ChannelSource>,
    handle: CloseHandle,
    estimator: Arc<ClockTempoEstimator>,
    realtime: Arc<Mutex<Option<TimedRealtimeHandler>>>,
}

impl fmt::Debug for LiveReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveReader")
            .field("decoder", &self.decoder)
            .field("handle", &self.handle)
            .field("bpm", &self.estimator.bpm())
            .finish()
    }
}

impl LiveReader {
    pub fn open(
        input: Arc<dyn MidiIn>,
        estimator: Arc<ClockTempoEstimator>,
        config: DecoderConfig,
    ) -> Result<Self> {
        let (packets_tx, packets_rx) = crossbeam_channel::unbounded::<Packet>();
        let (close_tx, close_rx) = crossbeam_channel::bounded(1);
        let listener = input.listen(Box::new(move |bytes: &[u8], timestamp: Duration| {
            // reader gone: nothing left to do with the bytes
            let _ = packets_tx.send((bytes.to_vec(), timestamp));
        }))?;

        let source = ChannelSource::new(packets_rx, close_rx);
        let timestamp = source.timestamp_cell();
        let mut decoder = ByteStreamDecoder::with_config(source, config);

        let realtime: Arc<Mutex<Option<TimedRealtimeHandler>>> = Arc::new(Mutex::new(None));
        {
            let estimator = Arc::clone(&estimator);
            let realtime = Arc::clone(&realtime);
            decoder.on_realtime(move |rt| {
                let ts = Duration::from_nanos(timestamp.load(Ordering::Acquire));
                match rt {
                    Realtime::Clock => {
                        estimator.observe_clock(ts);
                    }
                    Realtime::Start | Realtime::Continue | Realtime::Stop => estimator.restart(),
                    _ => {}
                }
                if let Some(handler) = realtime.lock().as_mut() {
                    handler(rt, ts);
                }
            });
        }

        tracing::debug!(port = %input.info().name, "live input opened");
        Ok(Self {
            decoder,
            handle: CloseHandle {
                input,
                listener,
                close: close_tx,
            },
            estimator,
            realtime,
        })
    }

    /// Receive realtime messages with their driver timestamps.
    pub fn on_realtime(&mut self, handler: impl FnMut(Realtime, Duration) + Send + 'static) {
        *self.realtime.lock() = Some(Box::new(handler));
    }

    pub fn estimator(&self) -> &Arc<ClockTempoEstimator> {
        &self.estimator
    }

    /// Current clock tempo estimate.
    pub fn bpm(&self) -> Option<f64> {
        self.estimator.bpm()
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.handle.clone()
    }

    pub fn close(&self) {
        self.handle.close();
    }

    /// Next message, blocking until one is complete. `Ok(None)` after close.
    pub fn read_one(&mut self) -> Result<Option<TimedMessage>> {
        let Some(message) = self.decoder.read_one()? else {
            return Ok(None);
        };
        let time = self.decoder.get_ref().timestamp();
        Ok(Some(TimedMessage::live(message, time)))
    }

    pub fn messages(&mut self) -> impl Iterator<Item = Result<TimedMessage>> + '_ {
        std::iter::from_fn(move || self.read_one().transpose())
    }
}

impl MessageSource for LiveReader {
    fn next_message(&mut self) -> Result<Option<TimedMessage>> {
        self.read_one()
    }
}

impl Drop for LiveReader {
    fn drop(&mut self) {
        self.handle.input.unlisten(self.handle.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{Driver, LoopbackDriver};
    use approx::assert_relative_eq;
    use legato_midi::{ChannelMessage, Message};

    fn setup() -> (LoopbackDriver, LiveReader) {
        let driver = LoopbackDriver::new("loop");
        driver.create_port("p");
        let reader = LiveReader::open(
            driver.open_input("p").unwrap(),
            Arc::new(ClockTempoEstimator::new()),
            DecoderConfig::default(),
        )
        .unwrap();
        (driver, reader)
    }

    #[test]
    fn test_messages_carry_packet_timestamps() {
        let (driver, mut reader) = setup();
        let out = driver.open_output("p").unwrap();
        out.send(&[0x90, 60], Duration::from_millis(1)).unwrap();
        out.send(&[100, 62, 0], Duration::from_millis(2)).unwrap();
        let first = reader.read_one().unwrap().unwrap();
        assert_eq!(
            first.message,
            Message::Channel(ChannelMessage::note_on(0, 60, 100).unwrap())
        );
        assert_eq!(first.time, Duration::from_millis(2));
        assert_eq!(first.position, None);
        let second = reader.read_one().unwrap().unwrap();
        assert_eq!(
            second.message,
            Message::Channel(ChannelMessage::note_off(0, 62).unwrap())
        );
        reader.close();
        assert!(reader.read_one().unwrap().is_none());
    }

    #[test]
    fn test_clock_feeds_estimator() {
        let (driver, mut reader) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            reader.on_realtime(move |rt, ts| seen.lock().push((rt, ts)));
        }
        let out = driver.open_output("p").unwrap();
        let interval = Duration::from_secs_f64(0.5 / 24.0);
        for i in 0..8u32 {
            out.send(&[0xF8], interval * i).unwrap();
        }
        out.send(&[0xC0, 5], interval * 8).unwrap();

        let msg = reader.read_one().unwrap().unwrap();
        assert_eq!(
            msg.message,
            Message::Channel(ChannelMessage::new(0, legato_midi::Voice::ProgramChange { program: 5 }).unwrap())
        );
        assert_relative_eq!(reader.bpm().unwrap(), 120.0, epsilon = 1e-4);
        assert_eq!(reader.estimator().pulses(), 8);
        assert_eq!(seen.lock().len(), 8);
        assert_eq!(seen.lock()[3], (Realtime::Clock, interval * 3));
    }

    #[test]
    fn test_close_from_another_thread() {
        let (_driver, mut reader) = setup();
        let handle = reader.close_handle();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.close();
        });
        assert!(reader.read_one().unwrap().is_none());
        worker.join().unwrap();
    }
}
