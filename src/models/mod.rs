pub mod generation;
pub mod profile;
pub mod request;

pub use generation::*;
pub use profile::*;
pub use request::*;
