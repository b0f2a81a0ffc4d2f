//! Dispatch engine
//!
//! One session drives a whole batch from a single task. Transfers for
//! different devices run concurrently in a [`FuturesUnordered`]; each device
//! has at most one transfer outstanding, so commands for the same device
//! complete in the order they were queued.
//!
//! All bookkeeping (busy devices, command states, failures) lives in the
//! session itself. The transfer futures only own a device handle and a
//! frame, which is why nothing here needs a lock.

use std::collections::HashMap;
use std::time::Duration;

use bitflags::bitflags;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use rcolorhug_core::protocol::{encode_request, opcodes};
use rcolorhug_core::DeviceId;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandState, Completion};
use crate::error::{CommandFailure, Error, Result};

bitflags! {
    /// How a batch reacts to failing commands
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProcessFlags: u32 {
        /// Keep running a device's remaining commands after one of them fails
        const CONTINUE_ON_ERROR = 1 << 0;
        /// Resolve the batch as success even if commands failed
        ///
        /// Failures are still reported through [`ProcessEvent::DeviceFailed`].
        const NONFATAL_ERRORS = 1 << 1;
    }
}

/// Notification emitted while a batch runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Percentage of commands that reached a terminal state
    Progress(u8),
    /// A command failed
    DeviceFailed {
        /// Device the command was sent to
        device: DeviceId,
        /// Error message
        message: String,
    },
}

/// Options for one [`process_with`](crate::CommandQueue::process_with) call
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Failure handling
    pub flags: ProcessFlags,
    /// Cancels the batch when triggered
    pub cancel: CancellationToken,
    /// Receives progress and failure notifications for this batch only
    pub events: Option<UnboundedSender<ProcessEvent>>,
}

impl ProcessOptions {
    /// Options with the given flags and no cancellation or events
    pub fn new(flags: ProcessFlags) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }

    /// Send events to `events`
    pub fn with_events(mut self, events: UnboundedSender<ProcessEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Cancel the batch when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

type Transfer = BoxFuture<'static, (usize, rcolorhug_core::Result<Vec<u8>>)>;

/// State of one process invocation
pub(crate) struct Session<'q, 'a> {
    commands: &'q mut [Command<'a>],
    options: ProcessOptions,
    timeout: Duration,
    /// Device -> index of its in-flight command
    busy: HashMap<DeviceId, usize>,
    in_flight: FuturesUnordered<Transfer>,
    failures: Vec<CommandFailure>,
    completed: usize,
}

impl<'q, 'a> Session<'q, 'a> {
    pub fn new(commands: &'q mut [Command<'a>], options: ProcessOptions, timeout: Duration) -> Self {
        Self {
            commands,
            options,
            timeout,
            busy: HashMap::new(),
            in_flight: FuturesUnordered::new(),
            failures: Vec::new(),
            completed: 0,
        }
    }

    /// Drive every command to a terminal state and resolve the batch
    pub async fn run(mut self) -> Result<()> {
        log::debug!("Processing {} commands", self.commands.len());
        self.progress();
        self.submit_idle();

        let cancel = self.options.cancel.clone();
        while !self.in_flight.is_empty() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.cancel();
                    return Err(Error::Cancelled {
                        failures: self.failures,
                    });
                }

                Some((index, result)) = self.in_flight.next() => {
                    self.complete(index, result);
                    self.submit_idle();
                }
            }
        }

        self.resolve()
    }

    fn resolve(self) -> Result<()> {
        if self.failures.is_empty() {
            log::debug!("Batch of {} commands succeeded", self.commands.len());
            return Ok(());
        }
        if self.options.flags.contains(ProcessFlags::NONFATAL_ERRORS) {
            log::debug!(
                "Batch finished with {} non-fatal failures",
                self.failures.len()
            );
            return Ok(());
        }
        log::debug!("Batch failed with {} failures", self.failures.len());
        Err(Error::Batch {
            failures: self.failures,
        })
    }

    /// Submit the first pending command of every idle device
    fn submit_idle(&mut self) {
        for index in 0..self.commands.len() {
            let cmd = &self.commands[index];
            if !cmd.is_pending() || self.busy.contains_key(cmd.device.id()) {
                continue;
            }
            self.submit(index);
        }
    }

    fn submit(&mut self, index: usize) {
        let cmd = &mut self.commands[index];
        let frame = match encode_request(cmd.opcode, &cmd.input) {
            Ok(frame) => frame,
            Err(e) => {
                // Never reaches the wire; the device stays idle
                cmd.state = CommandState::InFlight;
                self.fail(index, e);
                self.progress();
                return;
            }
        };

        log::trace!(
            "{}: submit {} ({} bytes)",
            cmd.device.id(),
            opcodes::name(cmd.opcode),
            cmd.input.len()
        );
        cmd.state = CommandState::InFlight;
        self.busy.insert(cmd.device.id().clone(), index);

        let device = cmd.device.clone();
        let timeout = self.timeout;
        self.in_flight.push(
            async move {
                let result = device.transfer(&frame, timeout).await;
                (index, result)
            }
            .boxed(),
        );
    }

    fn complete(&mut self, index: usize, result: rcolorhug_core::Result<Vec<u8>>) {
        let cmd = &mut self.commands[index];
        self.busy.remove(cmd.device.id());

        match result.and_then(|response| cmd.finish(&response)) {
            Ok(()) => {
                log::trace!("{}: {} complete", cmd.device.id(), opcodes::name(cmd.opcode));
                cmd.state = CommandState::Complete(Completion::Ok);
                self.completed += 1;
            }
            Err(e) => self.fail(index, e),
        }
        self.progress();
    }

    /// Record a failure and, unless told to carry on, abandon the rest of
    /// the device's work
    fn fail(&mut self, index: usize, error: rcolorhug_core::Error) {
        let cmd = &mut self.commands[index];
        cmd.state = CommandState::Complete(Completion::Failed);
        let device = cmd.device.id().clone();
        let opcode = cmd.opcode;
        self.completed += 1;

        log::warn!("{}: {} failed: {}", device, opcodes::name(opcode), error);
        self.emit(ProcessEvent::DeviceFailed {
            device: device.clone(),
            message: error.to_string(),
        });
        self.failures.push(CommandFailure {
            device: device.clone(),
            opcode,
            error,
        });

        if !self
            .options
            .flags
            .contains(ProcessFlags::CONTINUE_ON_ERROR)
        {
            self.abandon(|cmd| cmd.device.id() == &device);
        }
    }

    /// Mark matching pending commands as abandoned without sending them
    fn abandon<F>(&mut self, matches: F)
    where
        F: Fn(&Command<'a>) -> bool,
    {
        let mut abandoned = 0;
        for cmd in self.commands.iter_mut() {
            if cmd.is_pending() && matches(&*cmd) {
                cmd.state = CommandState::Complete(Completion::Abandoned);
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            log::debug!("Abandoned {} pending commands", abandoned);
            self.completed += abandoned;
        }
    }

    /// Drop every transfer and record the in-flight commands as cancelled
    fn cancel(&mut self) {
        log::debug!("Batch cancelled with {} transfers in flight", self.busy.len());
        self.in_flight = FuturesUnordered::new();

        let mut in_flight: Vec<usize> = self.busy.drain().map(|(_, index)| index).collect();
        in_flight.sort_unstable();
        for index in in_flight {
            let cmd = &mut self.commands[index];
            cmd.state = CommandState::Complete(Completion::Failed);
            let device = cmd.device.id().clone();
            let opcode = cmd.opcode;
            self.completed += 1;

            self.emit(ProcessEvent::DeviceFailed {
                device: device.clone(),
                message: rcolorhug_core::Error::Cancelled.to_string(),
            });
            self.failures.push(CommandFailure {
                device,
                opcode,
                error: rcolorhug_core::Error::Cancelled,
            });
        }

        self.abandon(|_| true);
        self.progress();
    }

    fn progress(&self) {
        let total = self.commands.len();
        let percent = if total == 0 {
            0
        } else {
            (self.completed * 100 / total) as u8
        };
        self.emit(ProcessEvent::Progress(percent));
    }

    fn emit(&self, event: ProcessEvent) {
        if let Some(events) = &self.options.events {
            // The receiver going away just means nobody is listening
            let _ = events.send(event);
        }
    }
}
