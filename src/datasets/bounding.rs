//! Convex hull of a dataset's spatial coverage, in Well-Known Text.

use std::fmt::Write;

/// A longitude/latitude pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull with Andrew's monotone chain.
///
/// The result is clockwise, starts at the lowest-left vertex and is not
/// closed. Collinear points are dropped.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points
        .iter()
        .copied()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .collect();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();

    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    // Both chains end where the other starts
    lower.pop();
    upper.pop();
    let mut ccw = lower;
    ccw.extend(upper);

    if ccw.len() < 3 {
        // All input points were collinear
        return vec![ccw[0], ccw[ccw.len() - 1]];
    }

    let start = ccw.remove(0);
    ccw.reverse();
    ccw.insert(0, start);
    ccw
}

fn push_coord(out: &mut String, p: Point) {
    let _ = write!(out, "{:.16} {:.16}", p.x, p.y);
}

/// WKT rendering of a hull: `POINT`, `LINESTRING` or a closed `POLYGON`.
pub fn hull_to_wkt(hull: &[Point]) -> Option<String> {
    let mut out = String::new();
    match hull {
        [] => return None,
        [p] => {
            out.push_str("POINT (");
            push_coord(&mut out, *p);
            out.push(')');
        }
        [a, b] => {
            out.push_str("LINESTRING (");
            push_coord(&mut out, *a);
            out.push_str(", ");
            push_coord(&mut out, *b);
            out.push(')');
        }
        ring => {
            out.push_str("POLYGON ((");
            for p in ring {
                push_coord(&mut out, *p);
                out.push_str(", ");
            }
            push_coord(&mut out, ring[0]);
            out.push_str("))");
        }
    }
    Some(out)
}

/// Bounding polygon for a coverage, or `None` if there is no coverage.
pub fn bounding_wkt(points: &[Point]) -> Option<String> {
    hull_to_wkt(&convex_hull(points))
}

/// Extract every coordinate pair from a WKT geometry.
pub fn parse_wkt_points(wkt: &str) -> Result<Vec<Point>, String> {
    let start = wkt.find('(');
    let end = wkt.rfind(')');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &wkt[s + 1..e],
        _ if wkt.trim().ends_with("EMPTY") => return Ok(Vec::new()),
        _ => return Err(format!("cannot parse WKT geometry {:?}", wkt)),
    };

    let mut points = Vec::new();
    for pair in body.split(',') {
        let pair = pair.trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace());
        if pair.is_empty() {
            continue;
        }
        let mut nums = pair.split_whitespace().map(str::parse::<f64>);
        match (nums.next(), nums.next()) {
            (Some(Ok(x)), Some(Ok(y))) => points.push(Point::new(x, y)),
            _ => return Err(format!("cannot parse WKT coordinate {:?}", pair)),
        }
    }
    Ok(points)
}
