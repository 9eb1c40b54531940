pub mod generate;
pub mod process;

pub use crate::domain::model::{Summary, UnitResult};
pub use crate::domain::ports::{Storage, Unit};
pub use generate::{Generator, Project};
pub use process::{Process, ProcessControl, Running};
