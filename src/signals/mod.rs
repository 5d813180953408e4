pub mod budget;
pub mod quality;
pub mod status;
pub mod verdict;

pub use budget::DetectionBudget;
pub use quality::QualityGate;
pub use status::StatusMapper;
