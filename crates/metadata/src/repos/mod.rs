//! Repository traits for metadata operations.

pub mod images;
pub mod jobs;
pub mod products;
pub mod uploads;

pub use images::ImageRepo;
pub use jobs::{JobRepo, JobState};
pub use products::ProductRepo;
pub use uploads::UploadRepo;
