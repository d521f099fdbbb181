//! Basic geometry of the delta drawing bot, including the shapes it can draw
//! and the conversion from Cartesian coordinates to actuator angles.
//!
//! The mechanism is a planar five-bar linkage: two motors sit on a horizontal
//! base, each turning an "upper arm." The two "forearms" hang off the ends of
//! the upper arms and meet at the "pen." Left and right are measured from the
//! point of view of the person looking at the robot.
//!
//! There are two coordinate systems, kept apart by `euclid` unit tags. A
//! [`Point`] lives in drawing space, measured in whatever [`Unit`] the user
//! picked (millimeters by default). A [`RobotPoint`] is measured in meters, with
//! the origin halfway between the two motors and `y` pointing away from the
//! base. [`Unit::to_robot`] converts from one to the other.

use serde::{Deserialize, Serialize};

pub mod shapes;

pub use shapes::{Circle, Curve, Direction, GeomError, Line, PartialCircle, Shape, Sweep};

pub type Angle = euclid::Angle<f64>;

/// Drawing space, in user units.
#[derive(Clone, Copy, Debug)]
pub struct Drawing;

/// Robot space, in meters.
#[derive(Clone, Copy, Debug)]
pub struct Meters;

pub type Point = euclid::Point2D<f64, Drawing>;
pub type Vector = euclid::Vector2D<f64, Drawing>;
pub type RobotPoint = euclid::Point2D<f64, Meters>;
pub type RobotVector = euclid::Vector2D<f64, Meters>;
pub type Len = euclid::Length<f64, Meters>;

fn square(x: f64) -> f64 {
    x * x
}

pub trait LenExt {
    fn mm(self) -> Len;
}

impl LenExt for f64 {
    fn mm(self) -> Len {
        Len::new(self / 1000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeftRight<T> {
    pub left: T,
    pub right: T,
}

/// Angles of the two motor-driven joints.
///
/// An angle is measured counter-clockwise from the positive `x` axis to the
/// upper arm. The two angles are only meaningful as a pair: they come out of
/// the solver together and go onto the wire together.
pub type ActuatorAngles = LeftRight<Angle>;

/// The unit that drawing-space coordinates are measured in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[serde(alias = "m")]
    Meter,
    #[serde(alias = "cm")]
    Centimeter,
    #[default]
    #[serde(alias = "mm")]
    Millimeter,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown unit \"{0}\"")]
pub struct UnknownUnit(pub String);

impl core::str::FromStr for Unit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m" | "meter" => Ok(Unit::Meter),
            "cm" | "centimeter" => Ok(Unit::Centimeter),
            "mm" | "millimeter" => Ok(Unit::Millimeter),
            _ => Err(UnknownUnit(s.to_owned())),
        }
    }
}

impl core::fmt::Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Unit::Meter => "m",
            Unit::Centimeter => "cm",
            Unit::Millimeter => "mm",
        })
    }
}

impl Unit {
    /// Parses a unit name, falling back to millimeters (with a warning) if
    /// the name isn't recognized.
    pub fn parse_or_default(s: &str) -> Unit {
        s.parse().unwrap_or_else(|e| {
            log::warn!("{e}, reverting to default (\"{}\")", Unit::default());
            Unit::default()
        })
    }

    /// How many of this unit make up a meter.
    pub fn scale(self) -> f64 {
        match self {
            Unit::Meter => 1.0,
            Unit::Centimeter => 100.0,
            Unit::Millimeter => 1000.0,
        }
    }

    pub fn to_robot(self, p: Point) -> RobotPoint {
        RobotPoint::new(p.x / self.scale(), p.y / self.scale())
    }

    pub fn to_drawing(self, p: RobotPoint) -> Point {
        Point::new(p.x * self.scale(), p.y * self.scale())
    }

    /// Converts a point given in millimeters into this unit.
    pub fn point_mm(self, x: f64, y: f64) -> Point {
        let s = self.scale() / 1000.0;
        Point::new(x * s, y * s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum KinematicError {
    #[error("position ({x}, {y}) is outside of the robot's domain")]
    Unreachable { x: f64, y: f64 },
}

pub struct ConfigBuilder {
    motor_distance: Len,
    upper_arm: Len,
    forearm: Len,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            motor_distance: 50.0.mm(),
            upper_arm: 80.0.mm(),
            forearm: 120.0.mm(),
        }
    }
}

impl ConfigBuilder {
    pub fn build(&self) -> Config {
        Config {
            motor_distance: self.motor_distance,
            upper_arm: self.upper_arm,
            forearm: self.forearm,
        }
    }

    pub fn with_motor_distance(&mut self, d: Len) -> &mut Self {
        self.motor_distance = d;
        self
    }

    pub fn with_upper_arm(&mut self, len: Len) -> &mut Self {
        self.upper_arm = len;
        self
    }

    pub fn with_forearm(&mut self, len: Len) -> &mut Self {
        self.forearm = len;
        self
    }
}

/// The geometric configuration of the arm.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// The horizontal distance between the two motor axles. (We assume that
    /// they're at the same height.)
    pub motor_distance: Len,
    /// Length from a motor axle to its elbow.
    pub upper_arm: Len,
    /// Length from an elbow to the pen.
    pub forearm: Len,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

impl Config {
    pub fn motors(&self) -> LeftRight<RobotPoint> {
        let d = self.motor_distance.get() / 2.0;
        LeftRight {
            left: RobotPoint::new(-d, 0.0),
            right: RobotPoint::new(d, 0.0),
        }
    }

    /// Solves for the actuator angles that put the pen at `p`.
    ///
    /// Both elbows bend outwards, away from the middle of the robot. Points
    /// at or below the motor axis are rejected, as are points that either arm
    /// can't reach.
    pub fn point_to_angles(&self, p: &RobotPoint) -> Result<ActuatorAngles, KinematicError> {
        let unreachable = KinematicError::Unreachable { x: p.x, y: p.y };
        if !(p.y > 0.0) {
            return Err(unreachable);
        }

        let motors = self.motors();
        let left = self.shoulder_angle(motors.left, p, 1.0).ok_or(unreachable)?;
        let right = self.shoulder_angle(motors.right, p, -1.0).ok_or(unreachable)?;
        Ok(ActuatorAngles { left, right })
    }

    // `bend` is +1 for an elbow that sits counter-clockwise of the line
    // from the motor to the pen, and -1 for clockwise.
    fn shoulder_angle(&self, motor: RobotPoint, p: &RobotPoint, bend: f64) -> Option<Angle> {
        let v = *p - motor;
        let dist = v.length();
        let a = self.upper_arm.get();
        let b = self.forearm.get();

        // Law of cosines, for the angle at the motor between the pen and the elbow.
        let cos_alpha = (square(a) + square(dist) - square(b)) / (2.0 * a * dist);
        if !(-1.0..=1.0).contains(&cos_alpha) {
            return None;
        }
        Some(Angle::radians(v.y.atan2(v.x) + bend * cos_alpha.acos()))
    }

    pub fn elbows(&self, angles: &ActuatorAngles) -> LeftRight<RobotPoint> {
        let motors = self.motors();
        let a = self.upper_arm.get();
        let elbow = |m: RobotPoint, ang: Angle| {
            let (sin, cos) = ang.sin_cos();
            m + RobotVector::new(cos, sin) * a
        };
        LeftRight {
            left: elbow(motors.left, angles.left),
            right: elbow(motors.right, angles.right),
        }
    }

    /// Computes where the pen ends up for a given pair of angles.
    ///
    /// Returns `None` if the forearms can't meet. Of the two places where they
    /// could meet, this picks the one further from the base.
    pub fn angles_to_point(&self, angles: &ActuatorAngles) -> Option<RobotPoint> {
        let elbows = self.elbows(angles);
        let b = self.forearm.get();
        let between = elbows.right - elbows.left;
        let d = between.length();
        if d == 0.0 || d > 2.0 * b {
            return None;
        }

        let h = (square(b) - square(d / 2.0)).sqrt();
        let mid = elbows.left + between / 2.0;
        let normal = RobotVector::new(-between.y, between.x) / d;
        Some(mid + normal * h)
    }
}

/// The outline of the region that is safe to draw in, as a box topped with a
/// dome. The corners are at x = ±70mm and y = 70mm and 120mm; the dome has a
/// radius of 80mm and peaks a little above 160mm.
pub fn domain_outline(unit: Unit) -> Result<Vec<Shape>, GeomError> {
    let bottom_left = unit.point_mm(-70.0, 70.0);
    let top_left = unit.point_mm(-70.0, 120.0);
    let top_right = unit.point_mm(70.0, 120.0);
    let bottom_right = unit.point_mm(70.0, 70.0);
    let dome_radius = 80.0 * unit.scale() / 1000.0;

    Ok(vec![
        Line::new(bottom_left, top_left).into(),
        Line::new(top_right, bottom_right).into(),
        Line::new(bottom_left, bottom_right).into(),
        PartialCircle::new(
            top_left,
            top_right,
            dome_radius,
            Direction::Clockwise,
            Sweep::Minor,
        )?
        .into(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Solving for the angles and then putting them back through the forward
        // kinematics should land us where we started.
        #[test]
        fn test_angles_inverse(x in -0.07..0.07f64, y in 0.07..0.12f64) {
            let cfg = Config::default();
            let p = RobotPoint::new(x, y);
            let angles = cfg.point_to_angles(&p).unwrap();
            let q = cfg.angles_to_point(&angles).unwrap();
            assert!((p.x - q.x).abs() < 1e-9);
            assert!((p.y - q.y).abs() < 1e-9);
        }

        #[test]
        fn test_elbows_have_arm_length(x in -0.07..0.07f64, y in 0.07..0.12f64) {
            let cfg = Config::default();
            let p = RobotPoint::new(x, y);
            let angles = cfg.point_to_angles(&p).unwrap();
            let elbows = cfg.elbows(&angles);
            let motors = cfg.motors();
            assert!(((elbows.left - motors.left).length() - cfg.upper_arm.get()).abs() < 1e-9);
            assert!(((elbows.right - motors.right).length() - cfg.upper_arm.get()).abs() < 1e-9);
            assert!(((p - elbows.left).length() - cfg.forearm.get()).abs() < 1e-9);
            assert!(((p - elbows.right).length() - cfg.forearm.get()).abs() < 1e-9);
        }

        #[test]
        fn test_scale_round_trip(x in -100.0..100.0f64, y in -100.0..100.0f64) {
            for unit in [Unit::Meter, Unit::Centimeter, Unit::Millimeter] {
                let p = Point::new(x, y);
                let q = unit.to_drawing(unit.to_robot(p));
                assert!((p.x - q.x).abs() < 1e-9);
                assert!((p.y - q.y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn unreachable_points() {
        let cfg = Config::default();
        for (x, y) in [(0.0, 0.0), (0.0, 0.01), (0.0, 0.25), (0.3, 0.1), (0.0, -0.1)] {
            assert_eq!(
                cfg.point_to_angles(&RobotPoint::new(x, y)),
                Err(KinematicError::Unreachable { x, y })
            );
        }
    }

    #[test]
    fn straight_up_is_symmetric() {
        let cfg = Config::default();
        let angles = cfg.point_to_angles(&RobotPoint::new(0.0, 0.1)).unwrap();
        let left = angles.left.to_degrees();
        let right = angles.right.to_degrees();
        assert!((left + right - 180.0).abs() < 1e-9);
        assert!(left > 90.0);
    }

    #[test]
    fn domain_is_reachable() {
        let cfg = Config::default();
        for shape in domain_outline(Unit::Millimeter).unwrap() {
            for i in 0..=50 {
                let p = shape.point_at(i as f64 / 50.0);
                assert!(
                    cfg.point_to_angles(&Unit::Millimeter.to_robot(p)).is_ok(),
                    "{p:?} should be reachable"
                );
            }
        }
    }

    #[test]
    fn domain_scales_with_unit() {
        let mm = domain_outline(Unit::Millimeter).unwrap();
        let cm = domain_outline(Unit::Centimeter).unwrap();
        for (a, b) in mm.iter().zip(&cm) {
            let pa = a.point_at(0.3);
            let pb = b.point_at(0.3);
            assert!((pa.x / 10.0 - pb.x).abs() < 1e-9);
            assert!((pa.y / 10.0 - pb.y).abs() < 1e-9);
        }
    }

    #[test]
    fn parse_units() {
        assert_eq!("mm".parse(), Ok(Unit::Millimeter));
        assert_eq!("Centimeter".parse(), Ok(Unit::Centimeter));
        assert_eq!("m".parse(), Ok(Unit::Meter));
        assert!("inch".parse::<Unit>().is_err());
        assert_eq!(Unit::parse_or_default("furlong"), Unit::Millimeter);
    }
}
