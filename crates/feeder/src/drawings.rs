//! Ready-made drawings, laid out in millimeters around the middle of the
//! drawing area.

use deltabot_geom::{
    Circle, Direction, GeomError, Line, PartialCircle, Point, Shape, Sweep, Unit,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Builtin {
    Line,
    Square,
    Triangle,
    Star,
    Heart,
    Circle,
    /// The word "eram" in block letters.
    Eram,
}

impl Builtin {
    pub fn shapes(self, unit: Unit) -> Result<Vec<Shape>, GeomError> {
        let mut sk = Sketch::new(unit);
        match self {
            Builtin::Line => sk.line([-30.0, 80.0], [40.0, 100.0]),
            Builtin::Square => sk.square(40.0, [0.0, 100.0]),
            Builtin::Triangle => sk.triangle(50.0, [0.0, 100.0]),
            Builtin::Star => sk.star(40.0, [0.0, 110.0]),
            Builtin::Heart => sk.heart()?,
            Builtin::Circle => sk.circle([0.0, 110.0], 20.0),
            Builtin::Eram => sk.word("eram", -40.0, 100.0, 10.0)?,
        }
        Ok(sk.shapes)
    }
}

struct Sketch {
    unit: Unit,
    shapes: Vec<Shape>,
}

impl Sketch {
    fn new(unit: Unit) -> Self {
        Sketch {
            unit,
            shapes: Vec::new(),
        }
    }

    fn pt(&self, [x, y]: [f64; 2]) -> Point {
        self.unit.point_mm(x, y)
    }

    fn len(&self, mm: f64) -> f64 {
        mm * self.unit.scale() / 1000.0
    }

    fn line(&mut self, a: [f64; 2], b: [f64; 2]) {
        self.shapes.push(Line::new(self.pt(a), self.pt(b)).into());
    }

    fn circle(&mut self, center: [f64; 2], radius: f64) {
        self.shapes
            .push(Circle::new(self.pt(center), self.len(radius)).into());
    }

    fn arc(
        &mut self,
        a: [f64; 2],
        b: [f64; 2],
        radius: f64,
        direction: Direction,
        sweep: Sweep,
    ) -> Result<(), GeomError> {
        let arc = PartialCircle::new(self.pt(a), self.pt(b), self.len(radius), direction, sweep)?;
        self.shapes.push(arc.into());
        Ok(())
    }

    fn polygon(&mut self, corners: &[[f64; 2]]) {
        for (i, &a) in corners.iter().enumerate() {
            let b = corners[(i + 1) % corners.len()];
            self.line(a, b);
        }
    }

    fn square(&mut self, width: f64, [cx, cy]: [f64; 2]) {
        let h = width / 2.0;
        self.polygon(&[
            [cx - h, cy + h],
            [cx + h, cy + h],
            [cx + h, cy - h],
            [cx - h, cy - h],
        ]);
    }

    // Equilateral, with its base at the bottom.
    fn triangle(&mut self, size: f64, [cx, cy]: [f64; 2]) {
        let h = size * 3f64.sqrt() / 2.0;
        self.polygon(&[
            [cx - size / 2.0, cy - h / 3.0],
            [cx + size / 2.0, cy - h / 3.0],
            [cx, cy + 2.0 * h / 3.0],
        ]);
    }

    // Ten corners alternating between the outer radius and half of it.
    fn star(&mut self, size: f64, [cx, cy]: [f64; 2]) {
        let corners: Vec<[f64; 2]> = (0..10)
            .map(|i| {
                let r = if i % 2 == 0 { size } else { size / 2.0 };
                let (sin, cos) = (36.0 * i as f64 - 90.0).to_radians().sin_cos();
                [cx + r * cos, cy + r * sin]
            })
            .collect();
        self.polygon(&corners);
    }

    fn heart(&mut self) -> Result<(), GeomError> {
        use Direction::CounterClockwise;
        self.arc([0.0, 135.0], [-40.0, 110.0], 25.0, CounterClockwise, Sweep::Major)?;
        self.line([-40.0, 110.0], [0.0, 75.0]);
        self.line([0.0, 75.0], [40.0, 110.0]);
        self.arc([40.0, 110.0], [0.0, 135.0], 25.0, CounterClockwise, Sweep::Major)
    }

    /// Block letters centered on `(x, y)`, `2 * s` high and about `1.2 * s`
    /// wide. Unsupported characters leave a gap.
    fn word(&mut self, word: &str, start_x: f64, y: f64, s: f64) -> Result<(), GeomError> {
        let spacing = (1.6 * s).trunc();
        let mut x = start_x;
        for c in word.chars() {
            match c.to_ascii_uppercase() {
                'A' => self.letter_a(x, y, s),
                'E' => self.letter_e(x, y, s),
                'M' => self.letter_m(x, y, s),
                'R' => self.letter_r(x, y, s)?,
                ' ' => {}
                other => log::info!("skipping unsupported character '{other}'"),
            }
            x += spacing;
        }
        Ok(())
    }

    fn letter_e(&mut self, x: f64, y: f64, s: f64) {
        let (left, right) = (x - 0.6 * s, x + 0.6 * s);
        let (bottom, top) = (y - s, y + s);
        self.line([left, bottom], [left, top]);
        self.line([left, top], [right, top]);
        self.line([left, y], [right - 0.24 * s, y]);
        self.line([left, bottom], [right, bottom]);
    }

    fn letter_r(&mut self, x: f64, y: f64, s: f64) -> Result<(), GeomError> {
        let (left, right) = (x - 0.6 * s, x + 0.6 * s);
        let (bottom, top) = (y - s, y + s);
        self.line([left, bottom], [left, top]);
        self.line([left, top], [right, top]);
        self.arc([left, top], [left, y], 0.9 * s, Direction::Clockwise, Sweep::Minor)?;
        self.line([left, y], [right, bottom]);
        Ok(())
    }

    fn letter_a(&mut self, x: f64, y: f64, s: f64) {
        let (left, right) = (x - 0.6 * s, x + 0.6 * s);
        let (bottom, top) = (y - s, y + s);
        self.line([left, bottom], [x, top]);
        self.line([right, bottom], [x, top]);
        self.line([left + 0.24 * s, y], [right - 0.24 * s, y]);
    }

    fn letter_m(&mut self, x: f64, y: f64, s: f64) {
        let (left, right) = (x - 0.6 * s, x + 0.6 * s);
        let (bottom, top) = (y - s, y + s);
        let dip = bottom + 0.8 * s;
        self.line([left, bottom], [left, top]);
        self.line([right, bottom], [right, top]);
        self.line([left, top], [x, dip]);
        self.line([right, top], [x, dip]);
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum as _;
    use deltabot_geom::{Config, Curve as _};

    use super::*;

    fn assert_close(a: Point, b: Point) {
        assert!((a - b).length() < 1e-9, "{a:?} != {b:?}");
    }

    #[test]
    fn everything_is_reachable() {
        let config = Config::default();
        for builtin in Builtin::value_variants() {
            let shapes = builtin.shapes(Unit::Millimeter).unwrap();
            assert!(!shapes.is_empty());
            for shape in &shapes {
                for i in 0..=20 {
                    let p = Unit::Millimeter.to_robot(shape.point_at(i as f64 / 20.0));
                    assert!(
                        config.point_to_angles(&p).is_ok(),
                        "{builtin:?} leaves the domain at {p:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn closed_outlines() {
        for builtin in [Builtin::Square, Builtin::Triangle, Builtin::Star, Builtin::Heart] {
            let shapes = builtin.shapes(Unit::Millimeter).unwrap();
            for w in shapes.windows(2) {
                assert_close(w[0].end(), w[1].start());
            }
            assert_close(shapes.last().unwrap().end(), shapes[0].start());
        }
    }

    #[test]
    fn star_has_ten_edges() {
        let shapes = Builtin::Star.shapes(Unit::Millimeter).unwrap();
        assert_eq!(shapes.len(), 10);
        // The first corner is straight below the center.
        assert_close(shapes[0].start(), Point::new(0.0, 70.0));
    }

    #[test]
    fn eram_letters() {
        let shapes = Builtin::Eram.shapes(Unit::Millimeter).unwrap();
        // E, R, A and M have 4, 4, 3 and 4 strokes.
        assert_eq!(shapes.len(), 15);
        assert!(matches!(shapes[6], Shape::Arc(_)));
    }

    #[test]
    fn scaled_to_unit() {
        let mm = Builtin::Square.shapes(Unit::Millimeter).unwrap();
        let cm = Builtin::Square.shapes(Unit::Centimeter).unwrap();
        for (a, b) in mm.iter().zip(&cm) {
            assert_close(a.start(), b.start() * 10.0);
        }

        let Shape::Circle(c) = Builtin::Circle.shapes(Unit::Meter).unwrap()[0] else {
            panic!("expected a circle");
        };
        assert!((c.radius() - 0.02).abs() < 1e-12);
    }
}
