//! Turns a queue of shapes into a sequence of points that, when sent at a
//! fixed rate, moves the pen at a constant speed.

use std::time::Duration;

use deltabot_geom::{Curve, Line, Point, Shape};

/// The shapes making up a drawing, in the order they'll be drawn.
///
/// Shapes are only ever appended; running the drawing consumes them.
#[derive(Clone, Debug, Default)]
pub struct Drawing {
    shapes: Vec<Shape>,
}

impl Drawing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, shape: impl Into<Shape>) {
        self.shapes.push(shape.into());
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn clear(&mut self) {
        self.shapes.clear();
    }

    pub fn take(&mut self) -> Vec<Shape> {
        std::mem::take(&mut self.shapes)
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PlannerConfig {
    /// How fast the pen moves, in drawing units per second.
    pub speed: f64,
    /// How long we wait between consecutive commands.
    pub command_interval: Duration,
    /// Each point goes out as one command per motor.
    pub commands_per_point: u32,
    /// Multiplies the number of points per shape. At 1.0 the points are spaced
    /// so that sending them at one per [`PlannerConfig::point_interval`] gives
    /// exactly `speed`.
    pub resolution_scale: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            speed: 200.0,
            command_interval: Duration::from_millis(5),
            commands_per_point: 2,
            resolution_scale: 1.0,
        }
    }
}

impl PlannerConfig {
    /// The time it takes to send all the commands for one point.
    pub fn point_interval(&self) -> Duration {
        self.command_interval * self.commands_per_point.max(1)
    }

    /// How many points to sample along `shape`.
    pub fn sample_count(&self, shape: &impl Curve) -> usize {
        let duration = shape.arc_length() / self.speed;
        let n = (self.resolution_scale * duration / self.point_interval().as_secs_f64()).round();
        if n.is_finite() && n > 0.0 {
            n as usize
        } else {
            0
        }
    }
}

/// Whether a planned point belongs to one of the user's shapes or to a line
/// that we inserted to get from the end of one shape to the start of the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stroke {
    Shape,
    Bridge,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MotionPlan {
    pub points: Vec<Point>,
    pub strokes: Vec<Stroke>,
}

impl MotionPlan {
    pub fn plan(shapes: &[Shape], config: &PlannerConfig) -> Self {
        let mut ret = MotionPlan::default();
        let Some(last) = shapes.last() else {
            return ret;
        };

        let mut prev: Option<&Shape> = None;
        for shape in shapes {
            if let Some(prev) = prev {
                if prev.end() != shape.start() {
                    let bridge = Line::new(prev.end(), shape.start());
                    ret.append_samples(&bridge, Stroke::Bridge, config);
                }
            }
            ret.append_samples(shape, Stroke::Shape, config);
            prev = Some(shape);
        }

        // Sampling stops one step short of t = 1, so the very last point
        // has to be added by hand.
        ret.points.push(last.point_at(1.0));
        ret.strokes.push(Stroke::Shape);
        ret
    }

    fn append_samples(&mut self, curve: &impl Curve, stroke: Stroke, config: &PlannerConfig) {
        let n = config.sample_count(curve);
        self.points
            .extend((0..n).map(|i| curve.point_at(i as f64 / n as f64)));
        self.strokes.extend(std::iter::repeat(stroke).take(n));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Roughly how long it takes to stream the whole plan.
    pub fn duration(&self, config: &PlannerConfig) -> Duration {
        config.point_interval() * self.points.len() as u32
    }
}
