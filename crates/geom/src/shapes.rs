//! The shapes that can be drawn: line segments, circles, and circular arcs.
//!
//! Every shape is a parametric curve on `t ∈ [0, 1]`, with `t = 0` at the
//! start point and `t = 1` at the end point. Evaluating outside that range
//! just extrapolates the formula.

use core::f64::consts::TAU;

use crate::{Point, Vector};

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeomError {
    #[error("arc chord of length {chord} is longer than twice the radius {radius}")]
    ChordTooLong { chord: f64, radius: f64 },
    #[error("arc start and end points coincide")]
    DegenerateChord,
    #[error("radius must be positive, got {0}")]
    NonPositiveRadius(f64),
}

pub trait Curve {
    fn start(&self) -> Point;
    fn end(&self) -> Point;
    fn arc_length(&self) -> f64;
    fn point_at(&self, t: f64) -> Point;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Line {
    start: Point,
    end: Point,
}

impl Line {
    pub fn new(start: impl Into<Point>, end: impl Into<Point>) -> Self {
        Line {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl Curve for Line {
    fn start(&self) -> Point {
        self.start
    }

    fn end(&self) -> Point {
        self.end
    }

    fn arc_length(&self) -> f64 {
        (self.end - self.start).length()
    }

    fn point_at(&self, t: f64) -> Point {
        self.start + (self.end - self.start) * t
    }
}

/// A full circle, starting and ending at its rightmost point and running
/// counter-clockwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    center: Point,
    radius: f64,
}

impl Circle {
    pub fn new(center: impl Into<Point>, radius: f64) -> Self {
        Circle {
            center: center.into(),
            radius,
        }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Curve for Circle {
    fn start(&self) -> Point {
        self.center + Vector::new(self.radius, 0.0)
    }

    fn end(&self) -> Point {
        self.start()
    }

    fn arc_length(&self) -> f64 {
        TAU * self.radius
    }

    fn point_at(&self, t: f64) -> Point {
        let (sin, cos) = (TAU * t).sin_cos();
        self.center + Vector::new(cos, sin) * self.radius
    }
}

/// Which way an arc turns on its way from start to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    CounterClockwise,
    Clockwise,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::CounterClockwise => 1.0,
            Direction::Clockwise => -1.0,
        }
    }
}

/// Two points and a radius determine two arcs turning in a given direction:
/// a short one and a long one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sweep {
    #[default]
    Minor,
    Major,
}

/// A circular arc between two points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PartialCircle {
    start: Point,
    end: Point,
    radius: f64,
    direction: Direction,
    center: Point,
    // The angle subtended by the arc, in radians. Always positive.
    section_angle: f64,
    // The angle of the start point, as seen from the center.
    offset: f64,
}

impl PartialCircle {
    pub fn new(
        start: impl Into<Point>,
        end: impl Into<Point>,
        radius: f64,
        direction: Direction,
        sweep: Sweep,
    ) -> Result<Self, GeomError> {
        let start = start.into();
        let end = end.into();
        if !(radius > 0.0) {
            return Err(GeomError::NonPositiveRadius(radius));
        }

        let chord = end - start;
        let chord_len = chord.length();
        if chord_len == 0.0 {
            return Err(GeomError::DegenerateChord);
        }
        let half_ratio = chord_len / (2.0 * radius);
        if half_ratio > 1.0 {
            return Err(GeomError::ChordTooLong {
                chord: chord_len,
                radius,
            });
        }

        let mut section_angle = 2.0 * half_ratio.asin();
        if sweep == Sweep::Major {
            section_angle = TAU - section_angle;
        }

        // The center is on the perpendicular bisector of the chord. For a major
        // arc the cosine goes negative, which puts it on the other side.
        let sign = direction.sign();
        let normal = Vector::new(-sign * chord.y, sign * chord.x) / chord_len;
        let midpoint = start + chord / 2.0;
        let center = midpoint + normal * (radius * (section_angle / 2.0).cos());

        let to_start = start - center;
        Ok(PartialCircle {
            start,
            end,
            radius,
            direction,
            center,
            section_angle,
            offset: to_start.y.atan2(to_start.x),
        })
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Curve for PartialCircle {
    fn start(&self) -> Point {
        self.start
    }

    fn end(&self) -> Point {
        self.end
    }

    fn arc_length(&self) -> f64 {
        self.section_angle * self.radius
    }

    fn point_at(&self, t: f64) -> Point {
        let angle = self.offset + t * self.direction.sign() * self.section_angle;
        let (sin, cos) = angle.sin_cos();
        self.center + Vector::new(cos, sin) * self.radius
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Line(Line),
    Circle(Circle),
    Arc(PartialCircle),
}

impl Curve for Shape {
    fn start(&self) -> Point {
        match self {
            Shape::Line(l) => l.start(),
            Shape::Circle(c) => c.start(),
            Shape::Arc(a) => a.start(),
        }
    }

    fn end(&self) -> Point {
        match self {
            Shape::Line(l) => l.end(),
            Shape::Circle(c) => c.end(),
            Shape::Arc(a) => a.end(),
        }
    }

    fn arc_length(&self) -> f64 {
        match self {
            Shape::Line(l) => l.arc_length(),
            Shape::Circle(c) => c.arc_length(),
            Shape::Arc(a) => a.arc_length(),
        }
    }

    fn point_at(&self, t: f64) -> Point {
        match self {
            Shape::Line(l) => l.point_at(t),
            Shape::Circle(c) => c.point_at(t),
            Shape::Arc(a) => a.point_at(t),
        }
    }
}

impl From<Line> for Shape {
    fn from(l: Line) -> Self {
        Shape::Line(l)
    }
}

impl From<Circle> for Shape {
    fn from(c: Circle) -> Self {
        Shape::Circle(c)
    }
}

impl From<PartialCircle> for Shape {
    fn from(a: PartialCircle) -> Self {
        Shape::Arc(a)
    }
}
