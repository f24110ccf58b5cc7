//! State encoder for RL - renders the keepout mask and planted seedlings into observations

use crate::infra::{Point, Position};
use crate::state::{KeepoutMask, SeedlingRegistry};

use super::config::ObservationMode;

/// Base code of an empty plantable cell
pub const EMPTY_CODE: u8 = 0;
/// Base code of a keepout cell
pub const KEEPOUT_CODE: u8 = 1;
/// Species `i` is encoded as `SPECIES_CODE_OFFSET + i`
pub const SPECIES_CODE_OFFSET: u8 = 2;

/// Distance channel value when nothing has been planted yet
pub const NO_SEEDLING_DISTANCE: u8 = u8::MAX;

pub const KEEPOUT_COLOR: [u8; 3] = [255, 0, 0];
pub const PLANTABLE_COLOR: [u8; 3] = [0, 0, 0];
pub const CURSOR_COLOR: [u8; 3] = [0, 0, 255];

/// Dense row-major `height x width x channels` grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<u8>,
}

impl Observation {
    fn zeros(size: usize, channels: usize) -> Self {
        Self {
            height: size,
            width: size,
            channels,
            data: vec![0; size * size * channels],
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    /// Value at column `x`, row `y`, channel `c`.
    pub fn get(&self, x: usize, y: usize, c: usize) -> Option<u8> {
        if x >= self.width || y >= self.height || c >= self.channels {
            return None;
        }
        self.data.get((y * self.width + x) * self.channels + c).copied()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    fn set(&mut self, cell: Position, values: &[u8]) {
        let start = cell.index(self.width) * self.channels;
        self.data[start..start + self.channels].copy_from_slice(values);
    }
}

/// Bounds of the observation array, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationSpace {
    pub shape: (usize, usize, usize),
    pub low: u8,
    pub high: u8,
}

impl ObservationSpace {
    pub fn contains(&self, obs: &Observation) -> bool {
        obs.shape() == self.shape && obs.as_slice().iter().all(|v| (self.low..=self.high).contains(v))
    }
}

/// Stateless: every call recomputes the observation from the mask and the registry.
#[derive(Debug, Clone, Copy)]
pub struct ObservationEncoder {
    mode: ObservationMode,
    grid_size: usize,
    species_count: usize,
}

impl ObservationEncoder {
    pub fn new(mode: ObservationMode, grid_size: usize, species_count: usize) -> Self {
        Self {
            mode,
            grid_size,
            species_count,
        }
    }

    pub fn channels(&self) -> usize {
        match self.mode {
            ObservationMode::GridSpecies => 1,
            ObservationMode::SpacingAware => 2,
            ObservationMode::ColorCoded => 3,
        }
    }

    pub fn space(&self) -> ObservationSpace {
        let high = match self.mode {
            ObservationMode::GridSpecies => SPECIES_CODE_OFFSET - 1 + self.species_count as u8,
            ObservationMode::SpacingAware | ObservationMode::ColorCoded => u8::MAX,
        };
        ObservationSpace {
            shape: (self.grid_size, self.grid_size, self.channels()),
            low: 0,
            high,
        }
    }

    /// `cursor` is drawn only in color-coded mode.
    pub fn encode(
        &self,
        mask: &KeepoutMask,
        registry: &SeedlingRegistry,
        cursor: Option<Position>,
    ) -> Observation {
        let codes = self.base_codes(mask, registry);
        let mut obs = Observation::zeros(self.grid_size, self.channels());

        match self.mode {
            ObservationMode::GridSpecies => obs.data.copy_from_slice(&codes),
            ObservationMode::SpacingAware => {
                let norm = self.grid_size as f64 * std::f64::consts::SQRT_2;
                for y in 0..self.grid_size {
                    for x in 0..self.grid_size {
                        let cell = Position::new(x as i32, y as i32);
                        let centre = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                        let distance = registry.nearest_distance(&centre);
                        let quantized = if distance.is_finite() {
                            ((distance / norm).min(1.0) * 255.0).round() as u8
                        } else {
                            NO_SEEDLING_DISTANCE
                        };
                        obs.set(cell, &[quantized, codes[cell.index(self.grid_size)]]);
                    }
                }
            }
            ObservationMode::ColorCoded => {
                for (i, &code) in codes.iter().enumerate() {
                    let cell = Position::new((i % self.grid_size) as i32, (i / self.grid_size) as i32);
                    let color = match code {
                        EMPTY_CODE => PLANTABLE_COLOR,
                        KEEPOUT_CODE => KEEPOUT_COLOR,
                        c => species_color((c - SPECIES_CODE_OFFSET) as usize, self.species_count),
                    };
                    obs.set(cell, &color);
                }
                if let Some(cursor) = cursor
                    && cursor.in_bounds(self.grid_size)
                {
                    obs.set(cursor, &CURSOR_COLOR);
                }
            }
        }

        obs
    }

    /// One code per cell: keepout or plantable, overridden by any seedling in the cell.
    pub fn base_codes(&self, mask: &KeepoutMask, registry: &SeedlingRegistry) -> Vec<u8> {
        let size = self.grid_size;
        let mut codes: Vec<u8> = (0..size * size)
            .map(|i| {
                let cell = Position::new((i % size) as i32, (i / size) as i32);
                if mask.is_plantable(cell) {
                    EMPTY_CODE
                } else {
                    KEEPOUT_CODE
                }
            })
            .collect();

        for seedling in registry.snapshot() {
            let species = seedling.species.min(self.species_count.saturating_sub(1));
            codes[seedling.cell(size).index(size)] = SPECIES_CODE_OFFSET + species as u8;
        }
        codes
    }
}

/// Evenly spaced hue for species `index` out of `count`, fully saturated.
pub fn species_color(index: usize, count: usize) -> [u8; 3] {
    let hue = (index % count.max(1)) as f64 / count.max(1) as f64;
    let h6 = 6.0 * hue;
    let ramp = |v: f64| (255.0 * v) as u8;
    match h6 {
        h if h < 1.0 => [255, ramp(h), 0],
        h if h < 2.0 => [ramp(2.0 - h), 255, 0],
        h if h < 3.0 => [0, 255, ramp(h - 2.0)],
        h if h < 4.0 => [0, ramp(4.0 - h), 255],
        h if h < 5.0 => [ramp(h - 4.0), 0, 255],
        h => [255, 0, ramp(6.0 - h)],
    }
}
