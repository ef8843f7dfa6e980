// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The process-wide context.
//!
//! The application has exactly one status queue and one profiler. A
//! [`System`] owns both, plus the configuration they were built from, and
//! lends them out: queue endpoints to the tasks, the profiler to the kernel's
//! switch hooks.
//!
//! A typical startup sequence, with the `System` in a `static` cell of the
//! application's choosing:
//!
//! ```ignore
//! let system = SYSTEM.init(System::start_or_halt(SystemConfig::DEFAULT, probe));
//! let parts = system.parts();
//! kernel.set_switch_hooks(parts.profiler);
//! executor.run(monitor::run_all(&kernel, parts.config, b1, b2, uart, parts.tx, parts.rx));
//! ```

use core::fmt;

use crate::config::{StartupError, SystemConfig, QUEUE_CAPACITY};
use crate::monitor::Message;
use crate::profiler::{Profiler, TraceProbe};
use crate::queue::{Queue, Receiver, Sender};

/// The status queue, at the configured capacity.
pub type StatusQueue = Queue<Message, QUEUE_CAPACITY>;

/// Producer end of the status queue.
pub type StatusSender<'q> = Sender<'q, Message, QUEUE_CAPACITY>;

/// Consumer end of the status queue.
pub type StatusReceiver<'q> = Receiver<'q, Message, QUEUE_CAPACITY>;

/// Shared state for the whole application.
pub struct System<P = ()> {
    config: SystemConfig,
    queue: StatusQueue,
    profiler: Profiler<P>,
}

/// Borrows handed out by [`System::parts`].
pub struct Parts<'s, P> {
    /// Status queue producer; copy it into each producing task.
    pub tx: StatusSender<'s>,
    /// Status queue consumer, for the receiver task.
    pub rx: StatusReceiver<'s>,
    /// The profiler, for the kernel's switch hooks and for health checks.
    pub profiler: &'s Profiler<P>,
    /// The validated configuration.
    pub config: &'s SystemConfig,
}

impl<P: TraceProbe> System<P> {
    /// Checks `config` and, if it's usable, builds an empty queue and a fresh
    /// profiler reporting to `probe`.
    ///
    /// Nothing is created if the configuration is rejected.
    pub fn new(config: SystemConfig, probe: P) -> Result<Self, StartupError> {
        if let Err(e) = config.validate() {
            log_error!("configuration rejected: {}", e);
            return Err(e);
        }
        log_info!("configuration accepted, queue capacity {}", QUEUE_CAPACITY);

        Ok(Self {
            config,
            queue: Queue::new(),
            profiler: Profiler::new(probe),
        })
    }

    /// Like [`System::new`], but treats a rejected configuration as fatal.
    pub fn start_or_halt(config: SystemConfig, probe: P) -> Self {
        match Self::new(config, probe) {
            Ok(system) => system,
            Err(e) => fatal(e),
        }
    }

    /// Splits the system into the pieces the tasks and the kernel need.
    ///
    /// Borrowing `self` exclusively means there is only ever one queue
    /// receiver at a time.
    pub fn parts(&mut self) -> Parts<'_, P> {
        let (tx, rx) = self.queue.split();
        Parts {
            tx,
            rx,
            profiler: &self.profiler,
            config: &self.config,
        }
    }

    /// The configuration the system was built from.
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// The profiler.
    pub fn profiler(&self) -> &Profiler<P> {
        &self.profiler
    }

    /// The status queue, for inspection.
    pub fn queue(&self) -> &StatusQueue {
        &self.queue
    }
}

impl<P: TraceProbe> fmt::Debug for System<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("profiler", &self.profiler)
            .finish()
    }
}

impl<P: TraceProbe> fmt::Debug for Parts<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parts")
            .field("tx", &self.tx)
            .field("rx", &self.rx)
            .field("profiler", self.profiler)
            .field("config", self.config)
            .finish()
    }
}

/// Reports a startup failure and stops.
///
/// There's no partially started system to fall back to, so this panics; the
/// application's panic handler decides what stopping means on the board.
pub fn fatal(err: StartupError) -> ! {
    log_error!("startup failed: {}", err);
    panic!("startup failed: {}", err)
}
