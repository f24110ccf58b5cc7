mod logging;
mod types;

pub use logging::init_logging;
pub use types::{Point, Position};
