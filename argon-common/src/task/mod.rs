mod instance;
mod stage;
mod update;

pub use instance::*;
pub use stage::*;
pub use update::*;
