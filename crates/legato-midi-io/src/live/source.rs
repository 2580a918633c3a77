//! Blocking byte source fed by a port listener.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, TryRecvError};

pub(crate) type Packet = (Vec<u8>, Duration);

/// Reads packets off a channel, one byte sequence after the other.
///
/// The timestamp of the packet currently being read is published through
/// a shared cell so realtime handlers running inside the decoder can see
/// it. Reads return 0 once the sender is gone or a close signal arrives.
pub(crate) struct ChannelSource {
    packets: Receiver<Packet>,
    close: Receiver<()>,
    current: Vec<u8>,
    pos: usize,
    timestamp: Arc<AtomicU64>,
    closed: bool,
}

impl ChannelSource {
    pub(crate) fn new(packets: Receiver<Packet>, close: Receiver<()>) -> Self {
        Self {
            packets,
            close,
            current: Vec::new(),
            pos: 0,
            timestamp: Arc::new(AtomicU64::new(0)),
            closed: false,
        }
    }

    pub(crate) fn timestamp_cell(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.timestamp)
    }

    pub(crate) fn timestamp(&self) -> Duration {
        Duration::from_nanos(self.timestamp.load(Ordering::Acquire))
    }

    fn next_packet(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if !matches!(self.close.try_recv(), Err(TryRecvError::Empty)) {
            self.closed = true;
            return false;
        }
        let packet = select! {
            recv(self.close) -> _ => None,
            recv(self.packets) -> packet => packet.ok(),
        };
        match packet {
            Some((bytes, timestamp)) => {
                let nanos = u64::try_from(timestamp.as_nanos()).unwrap_or(u64::MAX);
                self.timestamp.store(nanos, Ordering::Release);
                self.current = bytes;
                self.pos = 0;
                true
            }
            None => {
                self.closed = true;
                false
            }
        }
    }
}

impl Read for ChannelSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.current.len() {
            if !self.next_packet() {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};

    #[test]
    fn test_reads_across_packets() {
        let (tx, rx) = unbounded();
        let (_close_tx, close_rx) = bounded(1);
        let mut source = ChannelSource::new(rx, close_rx);
        tx.send((vec![1, 2], Duration::from_millis(1))).unwrap();
        tx.send((vec![], Duration::from_millis(2))).unwrap();
        tx.send((vec![3], Duration::from_millis(3))).unwrap();
        drop(tx);

        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(source.timestamp(), Duration::from_millis(3));
    }

    #[test]
    fn test_close_ends_stream() {
        let (tx, rx) = unbounded::<Packet>();
        let (close_tx, close_rx) = bounded(1);
        let mut source = ChannelSource::new(rx, close_rx);
        close_tx.send(()).unwrap();
        let mut byte = [0u8; 1];
        assert_eq!(source.read(&mut byte).unwrap(), 0);
        tx.send((vec![1], Duration::ZERO)).unwrap();
        assert_eq!(source.read(&mut byte).unwrap(), 0);
    }
}
