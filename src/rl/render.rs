//! Presentation of the current planting state. Never mutates the environment.

use std::fmt::Write;

use crate::infra::Position;
use crate::state::{KeepoutMask, SeedlingRegistry, SpeciesCatalog};

use super::config::ObservationMode;
use super::encoder::{Observation, ObservationEncoder};

/// Console view shows at most this many rows and columns, sampled evenly.
pub const CONSOLE_VIEW_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Rgb(Observation),
}

/// Letter for species `index` in the console view.
pub fn species_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// Summary, sampled grid (`.` plantable, `X` keepout, letters for species) and legend.
pub fn console_frame(
    mask: &KeepoutMask,
    registry: &SeedlingRegistry,
    species: &SpeciesCatalog,
    previous_carbon: f64,
) -> String {
    let size = mask.size();
    let mut grid: Vec<char> = (0..size * size)
        .map(|i| {
            let cell = Position::new((i % size) as i32, (i / size) as i32);
            if mask.is_plantable(cell) { '.' } else { 'X' }
        })
        .collect();
    for seedling in registry.snapshot() {
        grid[seedling.cell(size).index(size)] = species_letter(seedling.species);
    }

    let mut out = String::new();
    let _ = writeln!(out, "Seedlings planted: {}/{}", registry.count(), registry.limit());
    let _ = writeln!(out, "Total carbon: {previous_carbon:.2} kg");

    let view = CONSOLE_VIEW_SIZE.min(size);
    for row in 0..view {
        let y = row * size / view;
        let line: String = (0..view).map(|col| grid[y * size + col * size / view]).collect();
        let _ = writeln!(out, "{line}");
    }

    let _ = writeln!(out, "\nSpecies Legend:");
    for (i, name) in species.iter().enumerate() {
        let _ = writeln!(out, "{}: {}", species_letter(i), name);
    }
    out
}

/// Color-coded image of the site, with the cursor when there is one.
pub fn rgb_frame(
    mask: &KeepoutMask,
    registry: &SeedlingRegistry,
    species_count: usize,
    cursor: Option<Position>,
) -> Observation {
    ObservationEncoder::new(ObservationMode::ColorCoded, mask.size(), species_count)
        .encode(mask, registry, cursor)
}
