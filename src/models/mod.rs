pub mod biomarker;
pub mod enums;
pub mod panel;

pub use biomarker::*;
pub use panel::*;
