//! Buffering and paced delivery of commands.

use std::time::{Duration, Instant};

use deltabot_protocol::Cmd;
use indicatif::ProgressBar;

use crate::connection::Channel;

pub trait Clock {
    /// Time since some fixed starting point.
    fn now(&self) -> Duration;
    fn sleep(&self, d: Duration);
}

pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Keeps consecutive sends at least `interval` apart.
///
/// The wait is measured from the start of the previous send, so time spent
/// sending counts towards the interval and the average rate doesn't drift.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_send: Option<Duration>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Pacer {
            interval,
            last_send: None,
        }
    }

    /// Waits until it's time for the next send, and records the send as
    /// starting now.
    pub fn tick(&mut self, clock: &dyn Clock) {
        if let Some(last) = self.last_send {
            let remaining = self.interval.saturating_sub(clock.now().saturating_sub(last));
            if !remaining.is_zero() {
                clock.sleep(remaining);
            }
        }
        self.last_send = Some(clock.now());
    }
}

/// Asks the user whether to go ahead.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> bool;
}

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub command_interval: Duration,
    /// The pause after the priming commands.
    pub priming_settle: Duration,
    /// How many commands to send before asking for confirmation. The first
    /// point of a drawing is two commands, so this moves the pen to the start.
    pub priming_commands: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            command_interval: Duration::from_millis(5),
            priming_settle: Duration::from_millis(500),
            priming_commands: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every command was attempted.
    Completed,
    /// The user said no after the priming commands.
    Declined,
    /// The channel broke and couldn't be recovered.
    Interrupted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamReport {
    pub outcome: Outcome,
    pub sent: usize,
    /// Commands whose send failed. They aren't retried.
    pub failed: usize,
    /// Commands that were never attempted.
    pub skipped: usize,
}

impl StreamReport {
    fn new(outcome: Outcome) -> Self {
        StreamReport {
            outcome,
            sent: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// Encoded commands waiting to be sent.
pub struct Outbox {
    config: StreamConfig,
    clock: Box<dyn Clock>,
    progress: ProgressBar,
    buffer: Vec<Cmd>,
}

pub enum Flush {
    /// Nothing left to send.
    Done(StreamReport),
    /// Waiting for the go-ahead.
    Primed(Primed),
}

/// The commands left over after priming.
#[derive(Debug)]
pub struct Primed {
    rest: Vec<Cmd>,
    report: StreamReport,
}

impl Primed {
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    pub fn decline(self) -> StreamReport {
        StreamReport {
            outcome: Outcome::Declined,
            skipped: self.rest.len(),
            ..self.report
        }
    }
}

enum Delivery {
    Sent,
    Failed,
    Broken,
}

impl Outbox {
    pub fn new(config: StreamConfig) -> Self {
        Outbox::with_clock(config, Box::<SystemClock>::default())
    }

    pub fn with_clock(config: StreamConfig, clock: Box<dyn Clock>) -> Self {
        Outbox {
            config,
            clock,
            progress: ProgressBar::hidden(),
            buffer: Vec::new(),
        }
    }

    /// Reports streaming progress on `progress`, which is reset at the start
    /// of every flush.
    pub fn set_progress(&mut self, progress: ProgressBar) {
        self.progress = progress;
    }

    pub fn extend(&mut self, cmds: impl IntoIterator<Item = Cmd>) {
        self.buffer.extend(cmds);
    }

    pub fn commands(&self) -> &[Cmd] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Sends everything in the buffer, leaving it empty no matter how the
    /// delivery went.
    ///
    /// The priming commands go out immediately. Then we wait for the arm to
    /// settle and (if there's a `confirm`) ask whether to continue. The rest
    /// are paced at the command interval. A failed send is logged and dropped,
    /// after which we try to reconnect; if that fails too, we stop.
    pub fn flush(
        &mut self,
        channel: &mut dyn Channel,
        confirm: Option<&mut dyn Confirm>,
    ) -> StreamReport {
        let primed = match self.prime(channel) {
            Flush::Done(report) => return report,
            Flush::Primed(primed) => primed,
        };
        if let Some(confirm) = confirm {
            if !self.ask(confirm) {
                return primed.decline();
            }
        }
        self.resume(channel, primed)
    }

    /// The first half of [`Outbox::flush`]: takes everything out of the
    /// buffer, sends the priming commands and waits for the arm to settle.
    pub fn prime(&mut self, channel: &mut dyn Channel) -> Flush {
        let mut cmds = std::mem::take(&mut self.buffer);
        let mut report = StreamReport::new(Outcome::Completed);
        let rest = cmds.split_off(self.config.priming_commands.min(cmds.len()));

        self.progress.reset();
        self.progress.set_length((cmds.len() + rest.len()) as u64);

        for (i, cmd) in cmds.iter().enumerate() {
            if !self.deliver(channel, cmd, &mut report) {
                report.outcome = Outcome::Interrupted;
                report.skipped = cmds.len() - i - 1 + rest.len();
                return Flush::Done(report);
            }
        }
        if rest.is_empty() {
            self.progress.finish();
            return Flush::Done(report);
        }

        self.clock.sleep(self.config.priming_settle);
        Flush::Primed(Primed { rest, report })
    }

    pub fn ask(&self, confirm: &mut dyn Confirm) -> bool {
        let go = self
            .progress
            .suspend(|| confirm.confirm("Do you want to continue with this drawing?"));
        if !go {
            log::info!("drawing cancelled");
        }
        go
    }

    /// The second half of [`Outbox::flush`]: sends the rest at a steady pace.
    pub fn resume(&mut self, channel: &mut dyn Channel, primed: Primed) -> StreamReport {
        let Primed { rest, mut report } = primed;
        let mut pacer = Pacer::new(self.config.command_interval);
        for (i, cmd) in rest.iter().enumerate() {
            pacer.tick(&*self.clock);
            if !self.deliver(channel, cmd, &mut report) {
                report.outcome = Outcome::Interrupted;
                report.skipped = rest.len() - i - 1;
                break;
            }
        }
        self.progress.finish();
        report
    }

    // Returns false if the channel is beyond repair.
    fn deliver(&self, channel: &mut dyn Channel, cmd: &Cmd, report: &mut StreamReport) -> bool {
        let delivery = match channel.send(&cmd.to_bytes()) {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                log::warn!("failed to send {:?}: {e}", cmd.to_string().trim_end());
                match channel.reconnect() {
                    Ok(()) => Delivery::Failed,
                    Err(e) => {
                        log::error!("could not reconnect: {e}");
                        Delivery::Broken
                    }
                }
            }
        };
        self.progress.inc(1);
        match delivery {
            Delivery::Sent => {
                report.sent += 1;
                true
            }
            Delivery::Failed => {
                report.failed += 1;
                true
            }
            Delivery::Broken => {
                report.failed += 1;
                false
            }
        }
    }
}
