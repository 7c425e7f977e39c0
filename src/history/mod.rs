mod alerts;
mod model;
mod store;
mod tracker;

pub use alerts::{AlertKind, AlertSet, JobAlert};
pub use model::{HistoryStore, JobHistory};
pub use store::{HistoryRepository, JsonFileStore};
pub use tracker::{update_statistics, TrackerSettings};

#[cfg(test)]
pub use model::JobExecution;
#[cfg(test)]
pub use tracker::AlertMode;
