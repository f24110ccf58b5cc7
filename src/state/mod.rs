mod keepout;
mod registry;
mod species;

pub use keepout::{KeepoutGenerator, KeepoutMask, KeepoutMode};
pub use registry::{RegistryFull, Seedling, SeedlingRegistry};
pub use species::{ILAND_SPECIES, MAX_SPECIES, SpeciesCatalog};
