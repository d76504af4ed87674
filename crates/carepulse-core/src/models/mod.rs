//! Domain models for the CarePulse system.

mod appointment;
mod doctor;
mod patient;
mod user;

pub use appointment::*;
pub use doctor::*;
pub use patient::*;
pub use user::*;
