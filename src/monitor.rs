// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The application's tasks.
//!
//! Each task comes in two layers. The lower layer is a plain struct with a
//! synchronous `poll` method that does one period's worth of work and returns
//! what happened; these are what the tests drive directly. The upper layer is
//! an `async fn` that owns one of those structs, anchors a
//! [`PeriodicGate`] at the task's start, and calls `poll` once per period,
//! forever.
//!
//! Producers never wait for the queue. If it's full, the message is dropped
//! and the producer carries on; it'll have something to say next period.

use core::convert::Infallible;

use crate::config::{LoadConfig, SystemConfig};
use crate::hal::{DigitalInput, Level, SerialSink};
use crate::periodic::PeriodicGate;
use crate::queue::{Receiver, Sender};
use crate::time::{Clock, Kernel, Ticks};

/// A status message. Messages are string literals, so the queue never has to
/// worry about what it's pointing at going away.
pub type Message = &'static str;

/// Messages sent by the first button monitor.
pub const BUTTON1_MESSAGES: EdgeMessages = EdgeMessages {
    rising: "Rising:Button1\n\n",
    falling: "Falling:Button1\n\n",
};

/// Messages sent by the second button monitor.
pub const BUTTON2_MESSAGES: EdgeMessages = EdgeMessages {
    rising: "Rising:Button2\n\n",
    falling: "Falling:Button2\n\n",
};

/// Message sent by the periodic transmitter.
pub const PERIODIC_MESSAGE: Message = "Periodic String\n\n";

/// A change in level between two samples.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    /// Low to High.
    Rising,
    /// High to Low.
    Falling,
}

/// The pair of messages a button monitor chooses between.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdgeMessages {
    /// Sent on a Low to High transition.
    pub rising: Message,
    /// Sent on a High to Low transition.
    pub falling: Message,
}

impl EdgeMessages {
    /// The message announcing `edge`.
    pub fn for_edge(&self, edge: Edge) -> Message {
        match edge {
            Edge::Rising => self.rising,
            Edge::Falling => self.falling,
        }
    }
}

/// One bit of memory: the level seen at the previous sample.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdgeDetector {
    previous: Level,
}

impl EdgeDetector {
    /// Creates a detector that assumes the line was at `initial` before the
    /// first sample.
    pub const fn new(initial: Level) -> Self {
        Self { previous: initial }
    }

    /// The most recent sample (or the initial level, before any).
    pub fn previous(&self) -> Level {
        self.previous
    }

    /// Feeds in a new sample, reporting a transition if there was one.
    pub fn sample(&mut self, level: Level) -> Option<Edge> {
        let edge = match (self.previous, level) {
            (Level::Low, Level::High) => Some(Edge::Rising),
            (Level::High, Level::Low) => Some(Edge::Falling),
            _ => None,
        };
        self.previous = level;
        edge
    }
}

/// Watches one input and reports each transition on the queue.
#[derive(Debug)]
pub struct ButtonMonitor<I> {
    input: I,
    detector: EdgeDetector,
    messages: EdgeMessages,
}

impl<I: DigitalInput> ButtonMonitor<I> {
    /// Creates a monitor for `input`, assuming it was at `initial`.
    pub fn new(input: I, initial: Level, messages: EdgeMessages) -> Self {
        Self {
            input,
            detector: EdgeDetector::new(initial),
            messages,
        }
    }

    /// Samples the input once. On a transition, tries to queue the matching
    /// message and returns the edge, whether or not the message fit.
    pub fn poll<const N: usize>(
        &mut self,
        tx: &Sender<'_, Message, N>,
    ) -> Option<Edge> {
        let edge = self.detector.sample(self.input.read())?;
        let message = self.messages.for_edge(edge);
        if tx.try_send(message).is_err() {
            log_debug!("queue full, dropped {:?}", message);
        }
        Some(edge)
    }

    /// The edge detector's state.
    pub fn detector(&self) -> &EdgeDetector {
        &self.detector
    }
}

/// Sends the same message every time it's polled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PeriodicTransmitter {
    message: Message,
}

impl PeriodicTransmitter {
    /// Creates a transmitter for `message`.
    pub const fn new(message: Message) -> Self {
        Self { message }
    }

    /// Tries to queue the message once. Returns `true` if it fit.
    pub fn poll<const N: usize>(&self, tx: &Sender<'_, Message, N>) -> bool {
        match tx.try_send(self.message) {
            Ok(()) => true,
            Err(_) => {
                log_debug!("queue full, dropped periodic message");
                false
            }
        }
    }
}

impl Default for PeriodicTransmitter {
    fn default() -> Self {
        Self::new(PERIODIC_MESSAGE)
    }
}

/// Moves messages from the queue to a serial port, one per poll.
#[derive(Debug)]
pub struct Forwarder<S> {
    sink: S,
}

impl<S: SerialSink> Forwarder<S> {
    /// Creates a forwarder writing to `sink`.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Takes at most one message off the queue and writes it out.
    ///
    /// Returns `None` if the queue was empty, in which case nothing is
    /// written; otherwise, the number of bytes written.
    pub fn poll<const N: usize>(
        &mut self,
        rx: &mut Receiver<'_, Message, N>,
    ) -> Option<usize> {
        let message = rx.try_recv()?;
        Some(self.forward(message))
    }

    /// Writes `message` to the sink, stopping at its end or at the first NUL
    /// byte, whichever comes first. Returns the number of bytes written.
    pub fn forward(&mut self, message: Message) -> usize {
        let mut written = 0;
        for byte in message.bytes().take_while(|&b| b != 0) {
            self.sink.put_char(byte);
            written += 1;
        }
        written
    }

    /// The sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Gives the sink back.
    pub fn into_inner(self) -> S {
        self.sink
    }
}

/// Keeps the CPU busy for a fixed time per activation, so that the profiler
/// has something to measure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoadSimulator {
    busy: Ticks,
}

impl LoadSimulator {
    /// Creates a load that burns `busy` ticks per poll.
    pub const fn new(busy: Ticks) -> Self {
        Self { busy }
    }

    /// Spins on `clock` until `busy` ticks have passed, returning how long it
    /// actually spun. A zero budget returns at once without reading the clock.
    pub fn poll(&self, clock: &impl Clock) -> Ticks {
        if self.busy.is_zero() {
            return Ticks::ZERO;
        }
        let start = clock.now();
        let end = start + self.busy;
        loop {
            let now = clock.now();
            if now >= end {
                return now.ticks_since(start);
            }
            core::hint::spin_loop();
        }
    }
}

/// Runs a button monitor every `period`, forever.
pub async fn button_task<K, I, const N: usize>(
    kernel: K,
    period: Ticks,
    mut monitor: ButtonMonitor<I>,
    tx: Sender<'_, Message, N>,
) -> Infallible
where
    K: Kernel,
    I: DigitalInput,
{
    let mut gate = PeriodicGate::new(period, &kernel);
    loop {
        gate.next_time(&kernel).await;
        monitor.poll(&tx);
    }
}

/// Runs a periodic transmitter every `period`, forever.
pub async fn transmitter_task<K: Kernel, const N: usize>(
    kernel: K,
    period: Ticks,
    transmitter: PeriodicTransmitter,
    tx: Sender<'_, Message, N>,
) -> Infallible {
    let mut gate = PeriodicGate::new(period, &kernel);
    loop {
        gate.next_time(&kernel).await;
        transmitter.poll(&tx);
    }
}

/// Drains one message to the serial port every `period`, forever.
pub async fn receiver_task<K, S, const N: usize>(
    kernel: K,
    period: Ticks,
    mut forwarder: Forwarder<S>,
    mut rx: Receiver<'_, Message, N>,
) -> Infallible
where
    K: Kernel,
    S: SerialSink,
{
    let mut gate = PeriodicGate::new(period, &kernel);
    loop {
        gate.next_time(&kernel).await;
        forwarder.poll(&mut rx);
    }
}

/// Runs a synthetic load, forever. A disabled load (`None`) never does
/// anything.
pub async fn load_task<K: Kernel>(
    kernel: K,
    load: Option<LoadConfig>,
) -> Infallible {
    let Some(load) = load else {
        return futures::future::pending::<Infallible>().await;
    };
    let simulator = LoadSimulator::new(load.busy);
    let mut gate = PeriodicGate::new(load.period, &kernel);
    loop {
        gate.next_time(&kernel).await;
        simulator.poll(&kernel);
    }
}

/// Runs every task described by `config` in a single future.
///
/// This is for deployments with a single executor. Tasks interleave only at
/// their periodic suspension points, so a load task delays everything else
/// while it spins; with one executor per task, use the individual task
/// functions instead.
pub async fn run_all<K, B1, B2, S, const N: usize>(
    kernel: K,
    config: &SystemConfig,
    button1: B1,
    button2: B2,
    sink: S,
    tx: Sender<'_, Message, N>,
    rx: Receiver<'_, Message, N>,
) -> Infallible
where
    K: Kernel,
    B1: DigitalInput,
    B2: DigitalInput,
    S: SerialSink,
{
    log_info!(
        "starting tasks: {} {} {} {}",
        crate::task::TaskId::Button1.name(),
        crate::task::TaskId::Button2.name(),
        crate::task::TaskId::PeriodicTransmitter.name(),
        crate::task::TaskId::UartReceiver.name(),
    );

    let b1 = ButtonMonitor::new(button1, config.button1.initial, BUTTON1_MESSAGES);
    let b2 = ButtonMonitor::new(button2, config.button2.initial, BUTTON2_MESSAGES);

    let (never, ..) = futures::join!(
        button_task(&kernel, config.button1.period, b1, tx),
        button_task(&kernel, config.button2.period, b2, tx),
        transmitter_task(&kernel, config.transmitter_period, PeriodicTransmitter::default(), tx),
        receiver_task(&kernel, config.receiver_period, Forwarder::new(sink), rx),
        load_task(&kernel, config.load1),
        load_task(&kernel, config.load2),
    );
    never
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Queue;

    #[test]
    fn edges_from_reference_sequence() {
        let mut d = EdgeDetector::new(Level::High);
        let seen: std::vec::Vec<_> = [1, 1, 0, 0, 1]
            .into_iter()
            .map(|b| d.sample(Level::from(b == 1)))
            .collect();
        assert_eq!(
            seen,
            [None, None, Some(Edge::Falling), None, Some(Edge::Rising)],
        );
    }

    #[test]
    fn forwarding_stops_at_nul() {
        let mut f = Forwarder::new(Bytes::default());
        assert_eq!(f.forward("ab\0cd"), 2);
        assert_eq!(f.forward(""), 0);
        assert_eq!(f.into_inner().0, b"ab");
    }

    #[test]
    fn transmitter_reports_drops() {
        let mut q: Queue<Message, 1> = Queue::new();
        let (tx, _rx) = q.split();
        let t = PeriodicTransmitter::default();
        assert!(t.poll(&tx));
        assert!(!t.poll(&tx));
    }

    #[derive(Default)]
    struct Bytes(std::vec::Vec<u8>);

    impl SerialSink for Bytes {
        fn put_char(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }
}
