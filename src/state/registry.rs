use crate::infra::{Point, Position};

/// A planted sapling. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seedling {
    pub position: Point,
    pub species: usize,
}

impl Seedling {
    pub fn new(position: Point, species: usize) -> Self {
        Self { position, species }
    }

    pub fn cell(&self, grid_size: usize) -> Position {
        self.position.cell(grid_size)
    }
}

/// Returned by [`SeedlingRegistry::add`] when the episode target is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryFull {
    pub limit: usize,
}

/// Append-only store of the seedlings planted in the current episode.
#[derive(Debug, Clone)]
pub struct SeedlingRegistry {
    seedlings: Vec<Seedling>,
    limit: usize,
}

impl SeedlingRegistry {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            seedlings: Vec::with_capacity(limit.min(1024)),
            limit,
        }
    }

    pub fn add(&mut self, seedling: Seedling) -> Result<(), RegistryFull> {
        if self.seedlings.len() >= self.limit {
            return Err(RegistryFull { limit: self.limit });
        }
        self.seedlings.push(seedling);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.seedlings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seedlings.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Smallest Euclidean distance over all unordered pairs, `+inf` below two seedlings.
    pub fn min_pairwise_distance(&self) -> f64 {
        let mut min = f64::INFINITY;
        for (i, a) in self.seedlings.iter().enumerate() {
            for b in &self.seedlings[i + 1..] {
                min = min.min(a.position.distance(&b.position));
            }
        }
        min
    }

    /// Distance from `point` to the nearest seedling, `+inf` when empty.
    pub fn nearest_distance(&self, point: &Point) -> f64 {
        self.seedlings
            .iter()
            .map(|s| s.position.distance(point))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn is_occupied(&self, cell: Position, grid_size: usize) -> bool {
        self.seedlings.iter().any(|s| s.cell(grid_size) == cell)
    }

    pub fn snapshot(&self) -> &[Seedling] {
        &self.seedlings
    }

    pub fn clear(&mut self) {
        self.seedlings.clear();
    }
}
