//! Keepout masks - which cells of the site may receive a seedling

use rand::Rng;

use crate::infra::Position;

/// How a mask was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepoutMode {
    /// Shapes mark obstacles (roads, buildings); plant outside them.
    Exclusion,
    /// Shapes mark planting patches (Miyawaki-style circles); plant inside them.
    Inclusion,
}

/// Boolean planting-eligibility grid, row-major, `true` = plantable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepoutMask {
    size: usize,
    plantable: Vec<bool>,
    mode: KeepoutMode,
}

impl KeepoutMask {
    /// Build a mask from explicit cells. Returns `None` unless `plantable`
    /// holds exactly `size * size` entries.
    pub fn from_cells(size: usize, plantable: Vec<bool>, mode: KeepoutMode) -> Option<Self> {
        (plantable.len() == size * size).then_some(Self {
            size,
            plantable,
            mode,
        })
    }

    pub fn all_plantable(size: usize) -> Self {
        Self {
            size,
            plantable: vec![true; size * size],
            mode: KeepoutMode::Exclusion,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.size, self.size)
    }

    pub fn mode(&self) -> KeepoutMode {
        self.mode
    }

    /// Out-of-grid cells are never plantable.
    pub fn is_plantable(&self, pos: Position) -> bool {
        pos.in_bounds(self.size) && self.plantable[pos.index(self.size)]
    }

    pub fn plantable_count(&self) -> usize {
        self.plantable.iter().filter(|&&p| p).count()
    }

    pub fn cells(&self) -> &[bool] {
        &self.plantable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeKind {
    Rectangle,
    Circle,
    Triangle,
    Ellipse,
}

impl ShapeKind {
    const ALL: [ShapeKind; 4] = [
        ShapeKind::Rectangle,
        ShapeKind::Circle,
        ShapeKind::Triangle,
        ShapeKind::Ellipse,
    ];
}

/// A shape inside its bounding box on the grid.
#[derive(Debug, Clone, Copy)]
struct Footprint {
    kind: ShapeKind,
    left: usize,
    top: usize,
    width: usize,
    height: usize,
}

impl Footprint {
    /// Whether the centre of cell `(x, y)` lies inside the shape.
    fn contains(&self, x: usize, y: usize) -> bool {
        if x < self.left || y < self.top || x >= self.left + self.width || y >= self.top + self.height
        {
            return false;
        }

        let px = x as f64 + 0.5 - self.left as f64;
        let py = y as f64 + 0.5 - self.top as f64;
        let w = self.width as f64;
        let h = self.height as f64;

        match self.kind {
            ShapeKind::Rectangle => true,
            ShapeKind::Circle | ShapeKind::Ellipse => {
                let (rx, ry) = (w / 2.0, h / 2.0);
                let dx = (px - rx) / rx;
                let dy = (py - ry) / ry;
                dx * dx + dy * dy <= 1.0
            }
            ShapeKind::Triangle => {
                // Apex at the top centre, base along the bottom edge.
                let half_width = (py / h) * w / 2.0;
                (px - w / 2.0).abs() <= half_width
            }
        }
    }

    fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.top..self.top + self.height).flat_map(move |y| {
            (self.left..self.left + self.width)
                .filter(move |&x| self.contains(x, y))
                .map(move |x| (x, y))
        })
    }
}

/// Randomised keepout mask generator.
#[derive(Debug, Clone)]
pub struct KeepoutGenerator {
    /// Probability of exclusion mode; inclusion mode otherwise
    pub exclusion_probability: f64,
    pub min_shapes: usize,
    pub max_shapes: usize,
    /// Placement attempts per shape before giving up in inclusion mode
    pub placement_trials: usize,
}

impl Default for KeepoutGenerator {
    fn default() -> Self {
        Self {
            exclusion_probability: 0.5,
            min_shapes: 1,
            max_shapes: 10,
            placement_trials: 100,
        }
    }
}

impl KeepoutGenerator {
    /// Generate a fresh `grid_size x grid_size` mask, choosing the mode at random.
    pub fn generate<R: Rng + ?Sized>(&self, grid_size: usize, rng: &mut R) -> KeepoutMask {
        if rng.random::<f64>() < self.exclusion_probability {
            self.exclusion(grid_size, rng)
        } else {
            self.inclusion(grid_size, rng)
        }
    }

    /// 1-10 possibly overlapping shapes of size `[n/8, n/4]`; plantable outside all of them.
    pub fn exclusion<R: Rng + ?Sized>(&self, grid_size: usize, rng: &mut R) -> KeepoutMask {
        let mut covered = vec![false; grid_size * grid_size];
        if grid_size > 0 {
            let (lo, hi) = size_bounds(grid_size, 8, 4);
            for _ in 0..self.shape_count(rng) {
                let kind = ShapeKind::ALL[rng.random_range(0..ShapeKind::ALL.len())];
                let width = rng.random_range(lo..=hi);
                let height = match kind {
                    ShapeKind::Rectangle | ShapeKind::Ellipse => rng.random_range(lo..=hi),
                    ShapeKind::Circle | ShapeKind::Triangle => width,
                };
                let footprint = place(kind, width, height, grid_size, rng);
                for (x, y) in footprint.cells() {
                    covered[y * grid_size + x] = true;
                }
            }
        }

        KeepoutMask {
            size: grid_size,
            plantable: covered.into_iter().map(|c| !c).collect(),
            mode: KeepoutMode::Exclusion,
        }
    }

    /// 1-10 non-overlapping circles of size `[n/4, n/2]`; plantable inside any of them.
    pub fn inclusion<R: Rng + ?Sized>(&self, grid_size: usize, rng: &mut R) -> KeepoutMask {
        let mut covered = vec![false; grid_size * grid_size];
        if grid_size > 0 {
            let (lo, hi) = size_bounds(grid_size, 4, 2);
            for _ in 0..self.shape_count(rng) {
                for _ in 0..self.placement_trials.max(1) {
                    let diameter = rng.random_range(lo..=hi);
                    let footprint = place(ShapeKind::Circle, diameter, diameter, grid_size, rng);
                    if footprint.cells().any(|(x, y)| covered[y * grid_size + x]) {
                        continue;
                    }
                    for (x, y) in footprint.cells() {
                        covered[y * grid_size + x] = true;
                    }
                    break;
                }
            }
        }

        KeepoutMask {
            size: grid_size,
            plantable: covered,
            mode: KeepoutMode::Inclusion,
        }
    }

    fn shape_count<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let min = self.min_shapes.max(1);
        rng.random_range(min..=self.max_shapes.max(min))
    }
}

/// `(max(1, n / lo_div), max(lo, n / hi_div))`, never larger than the grid.
fn size_bounds(grid_size: usize, lo_div: usize, hi_div: usize) -> (usize, usize) {
    let lo = (grid_size / lo_div).max(1).min(grid_size);
    let hi = (grid_size / hi_div).max(lo).min(grid_size);
    (lo, hi)
}

fn place<R: Rng + ?Sized>(
    kind: ShapeKind,
    width: usize,
    height: usize,
    grid_size: usize,
    rng: &mut R,
) -> Footprint {
    Footprint {
        kind,
        left: rng.random_range(0..=grid_size - width),
        top: rng.random_range(0..=grid_size - height),
        width,
        height,
    }
}
