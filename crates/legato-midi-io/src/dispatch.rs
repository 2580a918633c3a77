//! Typed event dispatch with kind and channel subscriptions.
//!
//! A [`Dispatcher`] pulls messages from any [`MessageSource`], turns RPN/NRPN
//! controller traffic into [`ParameterEvent`]s when parameters are
//! subscribed, and hands the surviving events to a [`Handler`].

use std::io::Read;
use std::time::Duration;

use legato_midi::{
    ByteStreamDecoder, ControllerAggregator, ControllerOutput, Message, ParameterEvent, Voice,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::{Position, TimedMessage};
use crate::file::SmfReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum EventKind {
    Note = 1 << 0,
    ControlChange = 1 << 1,
    ProgramChange = 1 << 2,
    Aftertouch = 1 << 3,
    Pitchbend = 1 << 4,
    SystemCommon = 1 << 5,
    SysEx = 1 << 6,
    Meta = 1 << 7,
    /// RPN/NRPN events assembled from controller changes.
    Parameter = 1 << 8,
}

impl EventKind {
    #[inline]
    pub fn bit(self) -> u16 {
        self as u16
    }

    /// Kind of a message; `None` for realtime, which is never dispatched.
    pub fn of(msg: &Message) -> Option<Self> {
        Some(match msg {
            Message::Channel(ch) => match ch.voice {
                Voice::NoteOn { .. } | Voice::NoteOff { .. } | Voice::NoteOffVelocity { .. } => {
                    EventKind::Note
                }
                Voice::ControlChange { .. } => EventKind::ControlChange,
                Voice::ProgramChange { .. } => EventKind::ProgramChange,
                Voice::Aftertouch { .. } | Voice::PolyAftertouch { .. } => EventKind::Aftertouch,
                Voice::Pitchbend { .. } => EventKind::Pitchbend,
            },
            Message::Common(_) => EventKind::SystemCommon,
            Message::SysEx(_) => EventKind::SysEx,
            Message::Meta(_) => EventKind::Meta,
            Message::Realtime(_) => return None,
        })
    }
}

const ALL_KINDS: u16 = (1 << 9) - 1;

/// Subscribed event kinds and channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    kinds: u16,
    channels: u16,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl EventFilter {
    pub fn all() -> Self {
        Self {
            kinds: ALL_KINDS,
            channels: 0xffff,
        }
    }

    pub fn none() -> Self {
        Self {
            kinds: 0,
            channels: 0xffff,
        }
    }

    pub fn only(kinds: &[EventKind]) -> Self {
        kinds.iter().fold(Self::none(), |f, k| f.with(*k))
    }

    #[must_use]
    pub fn with(mut self, kind: EventKind) -> Self {
        self.kinds |= kind.bit();
        self
    }

    #[must_use]
    pub fn without(mut self, kind: EventKind) -> Self {
        self.kinds &= !kind.bit();
        self
    }

    /// Restrict channel events to `channels` (0-15). Others are ignored.
    #[must_use]
    pub fn with_channels(mut self, channels: &[u8]) -> Self {
        self.channels = 0;
        for channel in channels.iter().cloned() {
            if channel < 16 {
                self.channels |= 1 << channel;
            }
        }
        self
    }

    #[inline]
    pub fn contains(&self, kind: EventKind) -> bool {
        self.kinds & kind.bit() != 0
    }

    #[inline]
    pub fn channel(&self, channel: u8) -> bool {
        self.channels & (1 << (channel & 0x0f)) != 0
    }

    /// Whether `msg` passes both the kind and the channel subscription.
    pub fn accepts(&self, msg: &Message) -> bool {
        let Some(kind) = EventKind::of(msg) else {
            return false;
        };
        self.contains(kind) && msg.channel().map_or(true, |ch| self.channel(ch))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Message(Message),
    Parameter(ParameterEvent),
}

impl Event {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Event::Message(msg) => EventKind::of(msg),
            Event::Parameter(_) => Some(EventKind::Parameter),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub event: Event,
    pub position: Option<Position>,
    pub time: Duration,
}

/// Anything that yields timed messages until it runs dry.
pub trait MessageSource {
    fn next_message(&mut self) -> Result<Option<TimedMessage>>;
}

impl<R: Read> MessageSource for SmfReader<R> {
    fn next_message(&mut self) -> Result<Option<TimedMessage>> {
        self.read_one()
    }
}

/// Raw byte streams carry no timestamps; messages are stamped with zero.
impl<R: Read> MessageSource for ByteStreamDecoder<R> {
    fn next_message(&mut self) -> Result<Option<TimedMessage>> {
        Ok(self
            .read_one()?
            .map(|msg| TimedMessage::live(msg, Duration::ZERO)))
    }
}

pub trait Handler {
    fn handle(&mut self, event: &TimedEvent);
}

impl<F> Handler for F
where
    F: FnMut(&TimedEvent),
{
    fn handle(&mut self, event: &TimedEvent) {
        self(event)
    }
}

pub struct Dispatcher<S> {
    source: S,
    filter: EventFilter,
    aggregator: ControllerAggregator,
    last_track: Option<u16>,
}

impl<S: MessageSource> Dispatcher<S> {
    /// RPN/NRPN assembly is enabled iff `filter` subscribes to
    /// [`EventKind::Parameter`].
    pub fn new(source: S, filter: EventFilter) -> Self {
        Self {
            source,
            filter,
            aggregator: ControllerAggregator::new(filter.contains(EventKind::Parameter)),
            last_track: None,
        }
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
        self.aggregator
            .set_enabled(filter.contains(EventKind::Parameter));
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Next subscribed event, `Ok(None)` when the source is exhausted.
    pub fn next_event(&mut self) -> Result<Option<TimedEvent>> {
        while let Some(timed) = self.source.next_message()? {
            let track = timed.position.map(|p| p.track);
            if track != self.last_track {
                if self.last_track.is_some() {
                    tracing::trace!(?track, "new track, parameter state cleared");
                }
                self.aggregator.reset();
                self.last_track = track;
            }
            if let Some(event) = self.classify(timed.message) {
                return Ok(Some(TimedEvent {
                    event,
                    position: timed.position,
                    time: timed.time,
                }));
            }
        }
        Ok(None)
    }

    /// Deliver every event to `handler`; returns how many were delivered.
    pub fn run<H: Handler>(&mut self, mut handler: H) -> Result<usize> {
        let mut delivered = 0;
        while let Some(event) = self.next_event()? {
            handler.handle(&event);
            delivered += 1;
        }
        Ok(delivered)
    }

    fn classify(&mut self, msg: Message) -> Option<Event> {
        let controller = match &msg {
            Message::Channel(ch) => match ch.voice {
                Voice::ControlChange { controller, value } if self.aggregator.is_enabled() => {
                    Some((ch.channel, controller, value))
                }
                _ => None,
            },
            _ => None,
        };
        let Some((channel, controller, value)) = controller else {
            return self.filter.accepts(&msg).then_some(Event::Message(msg));
        };

        match self.aggregator.process(channel, controller, value)? {
            ControllerOutput::Change { .. } => {
                self.filter.accepts(&msg).then_some(Event::Message(msg))
            }
            ControllerOutput::Parameter(param) => {
                self.filter.channel(param.channel()).then_some(Event::Parameter(param))
            }
        }
    }
}
