/// Integer grid cell. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    /// Clamp into `[0, grid_size - 1]` on both axes.
    pub fn clamped(&self, grid_size: usize) -> Position {
        let max = grid_size.saturating_sub(1) as i32;
        Position::new(self.x.clamp(0, max), self.y.clamp(0, max))
    }

    pub fn in_bounds(&self, grid_size: usize) -> bool {
        let size = grid_size as i32;
        self.x >= 0 && self.y >= 0 && self.x < size && self.y < size
    }

    /// Row-major index into a `grid_size * grid_size` buffer.
    pub fn index(&self, grid_size: usize) -> usize {
        self.y as usize * grid_size + self.x as usize
    }

    /// Continuous coordinate of this cell's lower corner.
    pub fn to_point(&self) -> Point {
        Point::new(self.x as f64, self.y as f64)
    }
}

/// Continuous planting coordinate in grid units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// The grid cell containing this point, clamped to the grid.
    pub fn cell(&self, grid_size: usize) -> Position {
        let max = grid_size.saturating_sub(1) as f64;
        let x = if self.x.is_finite() { self.x.clamp(0.0, max) } else { 0.0 };
        let y = if self.y.is_finite() { self.y.clamp(0.0, max) } else { 0.0 };
        Position::new(x.floor() as i32, y.floor() as i32)
    }
}
