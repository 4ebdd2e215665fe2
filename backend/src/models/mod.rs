pub mod agent;
pub mod listing;
pub mod registration;
pub mod reputation;
pub mod verification;

pub use agent::*;
pub use listing::*;
pub use registration::*;
pub use reputation::*;
pub use verification::*;
