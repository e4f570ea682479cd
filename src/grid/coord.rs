//! Quadrant coordinates and inclusive rectangles.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Largest coordinate magnitude accepted from callers. Planning and legality
/// checks look a few cells past an area, so the range stays clear of the
/// `i32` limits.
pub const COORD_LIMIT: i32 = 1 << 30;

/// Integer quadrant coordinate. Ordering is raster order: row first, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Shift by `(dx, dy)`, saturating at the `i32` limits.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    pub fn checked_offset(self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self::new(self.x.checked_add(dx)?, self.y.checked_add(dy)?))
    }

    /// Reject coordinates outside `-COORD_LIMIT..=COORD_LIMIT`.
    pub fn validate(self) -> Result<Self, ApiError> {
        let limit = COORD_LIMIT.unsigned_abs();
        if self.x.unsigned_abs() > limit || self.y.unsigned_abs() > limit {
            return Err(ApiError::InvalidArea(format!(
                "coordinate {} is outside the supported range of +/-{}",
                self, COORD_LIMIT
            )));
        }
        Ok(self)
    }

    /// Von Neumann neighbors in the order up, right, down, left.
    pub fn neighbors4(self) -> [Coord; 4] {
        [
            self.offset(0, -1),
            self.offset(1, 0),
            self.offset(0, 1),
            self.offset(-1, 0),
        ]
    }

    /// Moore neighbors in raster order.
    pub fn neighbors8(self) -> [Coord; 8] {
        [
            self.offset(-1, -1),
            self.offset(0, -1),
            self.offset(1, -1),
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(-1, 1),
            self.offset(0, 1),
            self.offset(1, 1),
        ]
    }
}

impl Ord for Coord {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for Coord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

impl FromStr for Coord {
    type Err = ApiError;

    /// Accepts `x,y` or `(x,y)`, with optional whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);
        let mut parts = inner.split(',');
        let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ApiError::InvalidArea(format!(
                "Invalid coordinate '{}': expected x,y",
                s
            )));
        };
        let parse = |v: &str| {
            v.trim().parse::<i32>().map_err(|e| {
                ApiError::InvalidArea(format!("Invalid coordinate '{}': {}", s, e))
            })
        };
        Coord::new(parse(x)?, parse(y)?).validate()
    }
}

/// Parse a list of coordinates such as `(0,0),(1,0)` or `0,0;1,0`.
pub fn parse_coord_list(s: &str) -> Result<Vec<Coord>, ApiError> {
    let normalized = s.replace(")(", ");(").replace("),", ");");
    normalized
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(Coord::from_str)
        .collect()
}

/// Side of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

impl Edge {
    /// Edges parallel to the x axis.
    pub fn is_horizontal(self) -> bool {
        matches!(self, Edge::Top | Edge::Bottom)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Edge::Top => "top",
            Edge::Right => "right",
            Edge::Bottom => "bottom",
            Edge::Left => "left",
        };
        f.write_str(name)
    }
}

/// Axis-aligned rectangle with inclusive corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub tl: Coord,
    pub br: Coord,
}

impl Rect {
    pub fn new(tl: Coord, br: Coord) -> Result<Self, ApiError> {
        tl.validate()?;
        br.validate()?;
        if br.x < tl.x || br.y < tl.y {
            return Err(ApiError::InvalidArea(format!(
                "bottom-right {} must not precede top-left {}",
                br, tl
            )));
        }
        Ok(Self { tl, br })
    }

    pub fn single(c: Coord) -> Self {
        Self { tl: c, br: c }
    }

    /// Smallest rectangle containing every point, or `None` for an empty input.
    pub fn bounding<I: IntoIterator<Item = Coord>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut tl, mut br) = (first, first);
        for p in iter {
            tl.x = tl.x.min(p.x);
            tl.y = tl.y.min(p.y);
            br.x = br.x.max(p.x);
            br.y = br.y.max(p.y);
        }
        Some(Self { tl, br })
    }

    pub fn width(&self) -> i32 {
        span(self.tl.x, self.br.x)
    }

    pub fn height(&self) -> i32 {
        span(self.tl.y, self.br.y)
    }

    pub fn area(&self) -> usize {
        (self.width() as usize).saturating_mul(self.height() as usize)
    }

    pub fn contains(&self, c: Coord) -> bool {
        c.x >= self.tl.x && c.x <= self.br.x && c.y >= self.tl.y && c.y <= self.br.y
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.contains(other.tl) && self.contains(other.br)
    }

    /// All coordinates in raster order.
    pub fn points(&self) -> impl Iterator<Item = Coord> + '_ {
        (self.tl.y..=self.br.y)
            .flat_map(move |y| (self.tl.x..=self.br.x).map(move |x| Coord::new(x, y)))
    }

    /// Coordinates just outside the given side, in increasing order.
    pub fn exterior(&self, edge: Edge) -> Vec<Coord> {
        match edge {
            Edge::Top => (self.tl.x..=self.br.x)
                .map(|x| Coord::new(x, self.tl.y).offset(0, -1))
                .collect(),
            Edge::Bottom => (self.tl.x..=self.br.x)
                .map(|x| Coord::new(x, self.br.y).offset(0, 1))
                .collect(),
            Edge::Left => (self.tl.y..=self.br.y)
                .map(|y| Coord::new(self.tl.x, y).offset(-1, 0))
                .collect(),
            Edge::Right => (self.tl.y..=self.br.y)
                .map(|y| Coord::new(self.br.x, y).offset(1, 0))
                .collect(),
        }
    }
}

/// Inclusive length of `lo..=hi`, clamped to `0..=i32::MAX`.
fn span(lo: i32, hi: i32) -> i32 {
    let len = i64::from(hi) - i64::from(lo) + 1;
    i32::try_from(len.max(0)).unwrap_or(i32::MAX)
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tl, self.br)
    }
}
