//! SVG pictures of planned runs, for looking at before anything moves.

use deltabot_geom::{domain_outline, Config, Curve as _, GeomError, Point, Unit};
use deltabot_planner::{MotionPlan, Stroke};
use kurbo::{BezPath, Rect, Shape as _};
use svg::{
    node::element::{Circle, Path},
    Document,
};

// Enough to make the dome look round.
const OUTLINE_SAMPLES: usize = 64;

// SVG's y axis points down.
fn svg_point(p: Point) -> kurbo::Point {
    kurbo::Point::new(p.x, -p.y)
}

fn polyline(points: impl IntoIterator<Item = Point>) -> BezPath {
    let mut path = BezPath::new();
    for (i, p) in points.into_iter().enumerate() {
        if i == 0 {
            path.move_to(svg_point(p));
        } else {
            path.line_to(svg_point(p));
        }
    }
    path
}

fn outline(unit: Unit) -> Result<Vec<BezPath>, GeomError> {
    Ok(domain_outline(unit)?
        .iter()
        .map(|shape| {
            let t = |i: usize| i as f64 / OUTLINE_SAMPLES as f64;
            polyline((0..=OUTLINE_SAMPLES).map(|i| shape.point_at(t(i))))
        })
        .collect())
}

/// Splits the plan into pieces with the same kind of stroke.
///
/// The segment leading up to a piece's first point is the tail end of the
/// previous piece (a bridge starts exactly where its shape ended), so that's
/// where it gets drawn.
fn strokes(plan: &MotionPlan) -> Vec<(Stroke, BezPath)> {
    let mut ret: Vec<(Stroke, BezPath)> = Vec::new();
    for (&p, &stroke) in plan.points.iter().zip(&plan.strokes) {
        match ret.last_mut() {
            Some((s, path)) if *s == stroke => path.line_to(svg_point(p)),
            last => {
                if let Some((_, path)) = last {
                    path.line_to(svg_point(p));
                }
                let mut path = BezPath::new();
                path.move_to(svg_point(p));
                ret.push((stroke, path));
            }
        }
    }
    ret
}

struct Canvas {
    bounds: Rect,
    doc: Document,
}

impl Canvas {
    fn new<'a>(paths: impl IntoIterator<Item = &'a BezPath>) -> Self {
        let bounds = paths
            .into_iter()
            .map(|p| p.bounding_box())
            .reduce(|a, b| a.union(b))
            .unwrap_or(Rect::new(-1.0, -1.0, 1.0, 1.0));
        let bounds = bounds.inflate(bounds.width() * 0.05, bounds.height() * 0.05);
        let doc = Document::new().set(
            "viewBox",
            (bounds.x0, bounds.y0, bounds.width(), bounds.height()),
        );
        Canvas { bounds, doc }
    }

    fn line_width(&self) -> f64 {
        self.bounds.width().max(self.bounds.height()) / 300.0
    }

    fn path(&mut self, path: &BezPath, color: &str) {
        let elt = Path::new()
            .set("fill", "none")
            .set("stroke", color)
            .set("stroke-width", self.line_width())
            .set("d", path.to_svg());
        self.doc = std::mem::replace(&mut self.doc, Document::new()).add(elt);
    }

    fn dot(&mut self, p: Point, radius: f64, color: &str) {
        let p = svg_point(p);
        let elt = Circle::new()
            .set("cx", p.x)
            .set("cy", p.y)
            .set("r", radius * self.line_width())
            .set("fill", color);
        self.doc = std::mem::replace(&mut self.doc, Document::new()).add(elt);
    }
}

/// Draws the plan on top of the outline of the drawable area.
///
/// Shapes are black, the connecting lines between them are red, and the
/// start and end are marked with green and blue dots.
pub fn render(plan: &MotionPlan, unit: Unit) -> Result<Document, GeomError> {
    let outline = outline(unit)?;
    let strokes = strokes(plan);
    let mut canvas = Canvas::new(outline.iter().chain(strokes.iter().map(|(_, p)| p)));

    for path in &outline {
        canvas.path(path, "grey");
    }
    for (stroke, path) in &strokes {
        let color = match stroke {
            Stroke::Shape => "black",
            Stroke::Bridge => "red",
        };
        canvas.path(path, color);
    }
    if let (Some(&first), Some(&last)) = (plan.points.first(), plan.points.last()) {
        canvas.dot(first, 3.0, "green");
        canvas.dot(last, 3.0, "blue");
    }
    Ok(canvas.doc)
}

/// Points on a grid (in millimeter steps) that the arm can reach.
pub fn reachable_grid(config: &Config, unit: Unit, step_mm: f64) -> Vec<Point> {
    let n = (250.0 / step_mm).floor() as i32;
    let mut ret = Vec::new();
    for j in 0..=n {
        for i in -n / 2..=n / 2 {
            let p = unit.point_mm(i as f64 * step_mm, j as f64 * step_mm);
            if config.point_to_angles(&unit.to_robot(p)).is_ok() {
                ret.push(p);
            }
        }
    }
    ret
}

/// A map of where the arm can reach, with the drawable area on top.
pub fn render_domain(config: &Config, unit: Unit) -> Result<Document, GeomError> {
    let outline = outline(unit)?;
    let grid = reachable_grid(config, unit, 5.0);
    let dots = polyline(grid.iter().copied());
    let mut canvas = Canvas::new(outline.iter().chain([&dots]));
    for &p in &grid {
        canvas.dot(p, 1.0, "lightblue");
    }
    for path in &outline {
        canvas.path(path, "grey");
    }
    Ok(canvas.doc)
}
