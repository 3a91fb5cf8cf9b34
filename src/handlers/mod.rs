pub mod insights;
pub mod sync;
