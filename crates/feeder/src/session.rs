use std::io;

use deltabot_geom::{KinematicError, Point, Shape, Unit};
use deltabot_planner::{Drawing, MotionPlan, PlannerConfig};
use deltabot_protocol::{AngleEncoder, Cmd};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};

use crate::{
    connection::Channel,
    settings::Settings,
    stream::{Confirm, Flush, Outbox, StreamReport},
};

/// Where a run is at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Planning,
    Solving,
    Buffering,
    AwaitingConfirmation,
    Streaming,
    Aborted,
}

/// What to do with a planned point that the arm can't reach.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OnUnreachable {
    /// Give up on the whole run before anything is sent.
    #[default]
    Abort,
    /// Leave the point out and carry on.
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Domain = 1,
    Communication = 2,
    NoShapes = 3,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("list of shapes is empty, add some shapes for the robot to draw")]
    NoShapes,
    #[error("targeted position ({x}, {y}) is outside of the robot's domain")]
    Unreachable {
        x: f64,
        y: f64,
        #[source]
        source: KinematicError,
    },
    #[error("couldn't reach the drawing bot")]
    Channel(#[from] io::Error),
}

impl RunError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RunError::NoShapes => ErrorCode::NoShapes,
            RunError::Unreachable { .. } => ErrorCode::Domain,
            RunError::Channel(_) => ErrorCode::Communication,
        }
    }
}

/// A queue of shapes, and everything needed to turn them into motion.
pub struct DrawingBot {
    geometry: deltabot_geom::Config,
    unit: Unit,
    planner: PlannerConfig,
    encoder: AngleEncoder,
    on_unreachable: OnUnreachable,
    prompt: bool,
    drawing: Drawing,
    outbox: Outbox,
    state: RunState,
}

impl DrawingBot {
    pub fn new(settings: &Settings) -> Self {
        DrawingBot::with_outbox(settings, Outbox::new(settings.stream()))
    }

    pub fn with_outbox(settings: &Settings, outbox: Outbox) -> Self {
        DrawingBot {
            geometry: settings.geometry,
            unit: settings.unit,
            planner: settings.planner(),
            encoder: AngleEncoder::new(settings.gain),
            on_unreachable: settings.on_unreachable,
            prompt: settings.prompt,
            drawing: Drawing::new(),
            outbox,
            state: RunState::Idle,
        }
    }

    pub fn set_progress(&mut self, progress: ProgressBar) {
        self.outbox.set_progress(progress);
    }

    pub fn add_shape(&mut self, shape: impl Into<Shape>) {
        self.drawing.add(shape);
    }

    pub fn drawing(&self) -> &Drawing {
        &self.drawing
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The commands waiting to be sent.
    pub fn buffered(&self) -> &[Cmd] {
        self.outbox.commands()
    }

    /// Samples the queued shapes, without consuming them.
    pub fn plan(&self) -> MotionPlan {
        MotionPlan::plan(self.drawing.shapes(), &self.planner)
    }

    fn set_state(&mut self, state: RunState) {
        log::debug!("run state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn solve(&self, p: Point) -> Result<[Cmd; 2], RunError> {
        let angles = self
            .geometry
            .point_to_angles(&self.unit.to_robot(p))
            .map_err(|source| RunError::Unreachable {
                x: p.x,
                y: p.y,
                source,
            })?;
        Ok(self.encoder.encode(&angles))
    }

    /// Plans the queued shapes and fills the outbox with their commands, but
    /// doesn't send anything. Returns the number of buffered commands.
    ///
    /// On success the shape queue is emptied. If a point is out of reach and
    /// the policy is to abort, the queue is left alone and nothing is buffered.
    pub fn prepare(&mut self) -> Result<usize, RunError> {
        if self.drawing.is_empty() {
            return Err(RunError::NoShapes);
        }

        self.set_state(RunState::Planning);
        let plan = self.plan();
        log::info!(
            "planned {} points, about {:.1}s of drawing",
            plan.len(),
            plan.duration(&self.planner).as_secs_f64()
        );

        self.set_state(RunState::Solving);
        self.outbox.clear();
        let mut skipped = 0;
        for &p in &plan.points {
            match self.solve(p) {
                Ok(cmds) => self.outbox.extend(cmds),
                Err(e) if self.on_unreachable == OnUnreachable::Skip => {
                    log::warn!("skipping point: {e}");
                    skipped += 1;
                }
                Err(e) => {
                    self.outbox.clear();
                    self.set_state(RunState::Aborted);
                    return Err(e);
                }
            }
        }
        if skipped > 0 {
            log::warn!("skipped {skipped} of {} points", plan.len());
        }

        self.drawing.clear();
        self.set_state(RunState::Buffering);
        Ok(self.outbox.len())
    }

    /// Draws everything in the queue.
    ///
    /// The commands are all computed before `connect` is called, so a drawing
    /// that can't be drawn never touches the channel.
    pub fn execute<C: Channel>(
        &mut self,
        connect: impl FnOnce() -> io::Result<C>,
        confirm: &mut dyn Confirm,
    ) -> Result<StreamReport, RunError> {
        self.prepare()?;
        let mut channel = self.connect(connect)?;
        Ok(self.stream(&mut channel, confirm))
    }

    /// Moves the pen straight to `p`, without asking. The shape queue is
    /// untouched.
    pub fn move_to<C: Channel>(
        &mut self,
        p: Point,
        connect: impl FnOnce() -> io::Result<C>,
    ) -> Result<StreamReport, RunError> {
        let cmds = self.solve(p)?;
        self.outbox.clear();
        self.outbox.extend(cmds);
        self.set_state(RunState::Buffering);

        let mut channel = self.connect(connect)?;
        self.set_state(RunState::Streaming);
        let report = self.outbox.flush(&mut channel, None);
        self.set_state(RunState::Idle);
        Ok(report)
    }

    fn connect<C: Channel>(
        &mut self,
        connect: impl FnOnce() -> io::Result<C>,
    ) -> Result<C, RunError> {
        connect().map_err(|e| {
            self.outbox.clear();
            self.set_state(RunState::Aborted);
            RunError::Channel(e)
        })
    }

    fn stream(&mut self, channel: &mut dyn Channel, confirm: &mut dyn Confirm) -> StreamReport {
        self.set_state(if self.prompt {
            RunState::AwaitingConfirmation
        } else {
            RunState::Streaming
        });

        let report = match self.outbox.prime(channel) {
            Flush::Done(report) => report,
            Flush::Primed(primed) => {
                if self.prompt && !self.outbox.ask(confirm) {
                    primed.decline()
                } else {
                    self.set_state(RunState::Streaming);
                    log::debug!("streaming {} more commands", primed.remaining());
                    self.outbox.resume(channel, primed)
                }
            }
        };
        self.set_state(RunState::Idle);
        report
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use deltabot_geom::{Circle, Line};
    use deltabot_protocol::Side;

    use super::*;
    use crate::stream::{testing::*, Clock as _, Outcome, StreamConfig};

    fn bot(settings: &Settings, clock: &ManualClock) -> DrawingBot {
        DrawingBot::with_outbox(
            settings,
            Outbox::with_clock(settings.stream(), Box::new(clock.clone())),
        )
    }

    fn settings() -> Settings {
        Settings {
            speed: 20.0,
            ..Settings::default()
        }
    }

    fn no_channel() -> io::Result<RecordingChannel> {
        panic!("shouldn't have tried to connect")
    }

    #[test]
    fn empty_queue() {
        let clock = ManualClock::default();
        let mut bot = bot(&settings(), &clock);
        let err = bot
            .execute(no_channel, &mut ScriptedConfirm::default())
            .unwrap_err();
        assert!(matches!(err, RunError::NoShapes));
        assert_eq!(err.code() as u8, 3);
        assert_eq!(bot.state(), RunState::Idle);
    }

    #[test]
    fn draws_a_line() {
        let clock = ManualClock::default();
        let channel = RecordingChannel::new(clock.clone());
        let mut bot = bot(&settings(), &clock);
        bot.add_shape(Line::new([-10.0, 100.0], [10.0, 100.0]));

        let mut confirm = ScriptedConfirm::answering(true);
        let report = bot.execute(|| Ok(channel.clone()), &mut confirm).unwrap();

        // 20mm at 20mm/s, one point (two commands) every 10ms, plus the endpoint.
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.sent, 2 * 101);
        assert_eq!(confirm.asked, 1);
        assert!(bot.drawing().is_empty());
        assert!(bot.buffered().is_empty());
        assert_eq!(bot.state(), RunState::Idle);

        let cmds = channel.cmds();
        for pair in cmds.chunks(2) {
            assert!(matches!(pair[0], Cmd::Angle(Side::West, _)));
            assert!(matches!(pair[1], Cmd::Angle(Side::East, _)));
        }
        // The line is symmetric, so the first west angle mirrors the last east one.
        let (Cmd::Angle(_, first_west), Cmd::Angle(_, last_east)) = (cmds[0], cmds[cmds.len() - 1])
        else {
            unreachable!()
        };
        assert!((first_west + last_east - 3.0 * 180.0).abs() < 0.02);
    }

    #[test]
    fn buffered_commands_match_the_solver() {
        let clock = ManualClock::default();
        let settings = Settings {
            gain: 1.0,
            ..settings()
        };
        let mut bot = bot(&settings, &clock);
        bot.add_shape(Circle::new([0.0, 110.0], 20.0));
        let plan = bot.plan();
        let n = bot.prepare().unwrap();
        assert_eq!(n, 2 * plan.len());
        assert_eq!(bot.state(), RunState::Buffering);

        let p = deltabot_geom::RobotPoint::new(0.02, 0.11);
        let angles = settings.geometry.point_to_angles(&p).unwrap();
        let Cmd::Angle(Side::West, west) = bot.buffered()[0] else {
            panic!("expected a west angle");
        };
        assert!((west - angles.left.to_degrees()).abs() < 1e-9);
    }

    #[test]
    fn decline_sends_only_the_first_point() {
        let clock = ManualClock::default();
        let channel = RecordingChannel::new(clock.clone());
        let mut bot = bot(&settings(), &clock);
        bot.add_shape(Line::new([0.0, 90.0], [0.0, 100.0]));

        let mut confirm = ScriptedConfirm::answering(false);
        let report = bot.execute(|| Ok(channel.clone()), &mut confirm).unwrap();

        assert_eq!(report.outcome, Outcome::Declined);
        assert_eq!(channel.cmds().len(), 2);
        assert!(bot.buffered().is_empty());
        assert!(bot.drawing().is_empty());
        assert_eq!(bot.state(), RunState::Idle);
    }

    #[test]
    fn no_prompt() {
        let clock = ManualClock::default();
        let channel = RecordingChannel::new(clock.clone());
        let settings = Settings {
            prompt: false,
            ..settings()
        };
        let mut bot = bot(&settings, &clock);
        bot.add_shape(Line::new([0.0, 90.0], [0.0, 100.0]));

        let mut confirm = ScriptedConfirm::default();
        let report = bot.execute(|| Ok(channel.clone()), &mut confirm).unwrap();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(confirm.asked, 0);
    }

    #[test]
    fn unreachable_aborts_before_connecting() {
        let clock = ManualClock::default();
        let mut bot = bot(&settings(), &clock);
        bot.add_shape(Line::new([0.0, 100.0], [0.0, 0.0]));

        let err = bot
            .execute(no_channel, &mut ScriptedConfirm::default())
            .unwrap_err();
        assert!(matches!(err, RunError::Unreachable { .. }));
        assert_eq!(err.code() as u8, 1);
        assert_eq!(bot.state(), RunState::Aborted);
        assert!(bot.buffered().is_empty());
        // The shapes are still there, to be fixed up and tried again.
        assert_eq!(bot.drawing().len(), 1);
    }

    #[test]
    fn unreachable_points_can_be_skipped() {
        let clock = ManualClock::default();
        let settings = Settings {
            on_unreachable: OnUnreachable::Skip,
            ..settings()
        };
        let mut bot = bot(&settings, &clock);
        // Half of this line is too close to the motors.
        bot.add_shape(Line::new([0.0, 80.0], [0.0, 0.0]));
        let plan = bot.plan();
        let n = bot.prepare().unwrap();
        assert!(n > 0);
        assert!(n < 2 * plan.len());
        assert_eq!(n % 2, 0);
    }

    #[test]
    fn connection_failure() {
        let clock = ManualClock::default();
        let mut bot = bot(&settings(), &clock);
        bot.add_shape(Line::new([0.0, 90.0], [0.0, 100.0]));
        let err = bot
            .execute(
                || -> io::Result<RecordingChannel> { Err(io::ErrorKind::ConnectionRefused.into()) },
                &mut ScriptedConfirm::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Communication);
        assert_eq!(bot.state(), RunState::Aborted);
    }

    #[test]
    fn partial_delivery_still_ends_idle() {
        let clock = ManualClock::default();
        let mut channel = RecordingChannel::new(clock.clone());
        channel.failures = vec![5];
        let mut bot = bot(&settings(), &clock);
        bot.add_shape(Line::new([0.0, 90.0], [0.0, 100.0]));

        let mut confirm = ScriptedConfirm::answering(true);
        let report = bot.execute(|| Ok(channel.clone()), &mut confirm).unwrap();
        assert_eq!(report.outcome, Outcome::Interrupted);
        assert_eq!(report.sent, 5);
        assert_eq!(bot.state(), RunState::Idle);
    }

    #[test]
    fn move_keeps_the_queue() {
        let clock = ManualClock::default();
        let channel = RecordingChannel::new(clock.clone());
        let mut bot = bot(&settings(), &clock);
        bot.add_shape(Circle::new([0.0, 110.0], 20.0));

        let report = bot
            .move_to(Point::new(0.0, 100.0), || Ok(channel.clone()))
            .unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(bot.drawing().len(), 1);
        // A single point, so there's no settling delay.
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn paced_at_the_command_interval() {
        let clock = ManualClock::default();
        let channel = RecordingChannel::new(clock.clone());
        let settings = Settings {
            prompt: false,
            ..settings()
        };
        let mut bot = DrawingBot::with_outbox(
            &settings,
            Outbox::with_clock(
                StreamConfig {
                    priming_settle: Duration::ZERO,
                    ..settings.stream()
                },
                Box::new(clock.clone()),
            ),
        );
        bot.add_shape(Line::new([0.0, 90.0], [0.0, 100.0]));
        let plan = bot.plan();
        bot.execute(|| Ok(channel.clone()), &mut ScriptedConfirm::default())
            .unwrap();

        // Everything after the first point is one command per interval.
        let expected = Duration::from_millis(5) * (2 * plan.len() as u32 - 3);
        assert_eq!(clock.now(), expected);
    }

    #[test]
    fn drawing_takes_length_over_speed() {
        let clock = ManualClock::default();
        let channel = RecordingChannel::new(clock.clone());
        let settings = Settings {
            prompt: false,
            priming_settle_ms: 0,
            ..settings()
        };
        let mut bot = bot(&settings, &clock);
        // 10mm at 20mm/s.
        bot.add_shape(Line::new([0.0, 90.0], [0.0, 100.0]));
        bot.execute(|| Ok(channel.clone()), &mut ScriptedConfirm::default())
            .unwrap();

        let expected = Duration::from_millis(500);
        let slack = settings.planner().point_interval();
        let elapsed = clock.now();
        assert!(
            elapsed + slack >= expected && elapsed <= expected + slack,
            "took {elapsed:?}, expected about {expected:?}"
        );
    }
}
