//! Action space for RL - describes the agent's actions and decodes them into planting decisions

use thiserror::Error;

use crate::infra::{Point, Position};

use super::config::ActionMode;

/// Cursor moves available in walker mode, before the planting actions
pub const MOVE_ACTIONS: usize = 4;

/// Cursor displacement for each move action: right, up, left, down
const MOVES: [(i32, i32); MOVE_ACTIONS] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// An action as produced by the agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// x, y, species, each nominally in `[-1, 1]`
    Continuous([f32; 3]),
    /// Walker command index
    Discrete(usize),
}

/// Shape of the action space, for the agent side
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionSpace {
    Box { low: f32, high: f32, dims: usize },
    Discrete { n: usize },
}

impl ActionSpace {
    pub fn contains(&self, action: &Action) -> bool {
        match (self, action) {
            (ActionSpace::Box { low, high, dims }, Action::Continuous(v)) => {
                v.len() == *dims && v.iter().all(|c| (*low..=*high).contains(c))
            }
            (ActionSpace::Discrete { n }, Action::Discrete(i)) => i < n,
            _ => false,
        }
    }
}

/// What an action asks the environment to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Walker moved; the new cursor cell
    Move(Position),
    Plant {
        point: Point,
        cell: Position,
        species: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("action does not belong to the {mode:?} action space")]
pub struct ActionModeMismatch {
    pub mode: ActionMode,
}

/// Maps actions to grid positions and species. Pure: no state besides the grid shape.
#[derive(Debug, Clone, Copy)]
pub struct ActionCodec {
    mode: ActionMode,
    grid_size: usize,
    species_count: usize,
}

impl ActionCodec {
    pub fn new(mode: ActionMode, grid_size: usize, species_count: usize) -> Self {
        Self {
            mode,
            grid_size,
            species_count: species_count.max(1),
        }
    }

    pub fn space(&self) -> ActionSpace {
        match self.mode {
            ActionMode::Continuous => ActionSpace::Box {
                low: -1.0,
                high: 1.0,
                dims: 3,
            },
            ActionMode::DiscreteWalker => ActionSpace::Discrete {
                n: MOVE_ACTIONS + self.species_count,
            },
        }
    }

    /// Decode `action`. `cursor` is only read in walker mode.
    pub fn decode(&self, action: &Action, cursor: Position) -> Result<Decision, ActionModeMismatch> {
        match (self.mode, action) {
            (ActionMode::Continuous, Action::Continuous(v)) => Ok(self.decode_continuous(v)),
            (ActionMode::DiscreteWalker, Action::Discrete(index)) => {
                Ok(self.decode_walker(*index, cursor))
            }
            _ => Err(ActionModeMismatch { mode: self.mode }),
        }
    }

    fn decode_continuous(&self, v: &[f32; 3]) -> Decision {
        let size = self.grid_size as f64;
        let max = (size - 1.0).max(0.0);
        let point = Point::new((unit(v[0]) * size).min(max), (unit(v[1]) * size).min(max));
        let max_species = self.species_count - 1;
        let species = (unit(v[2]) * max_species as f64).round() as usize;

        Decision::Plant {
            point,
            cell: point.cell(self.grid_size),
            species: species.min(max_species),
        }
    }

    fn decode_walker(&self, index: usize, cursor: Position) -> Decision {
        let cursor = cursor.clamped(self.grid_size);
        match MOVES.get(index) {
            Some(&(dx, dy)) => Decision::Move(cursor.offset(dx, dy).clamped(self.grid_size)),
            None => Decision::Plant {
                point: cursor.to_point(),
                cell: cursor,
                species: (index - MOVE_ACTIONS).min(self.species_count - 1),
            },
        }
    }
}

/// `[-1, 1]` to `[0, 1]`. Out-of-range values clamp, non-finite ones count as 0.
fn unit(value: f32) -> f64 {
    let v = if value.is_finite() { value as f64 } else { 0.0 };
    (v.clamp(-1.0, 1.0) + 1.0) / 2.0
}
