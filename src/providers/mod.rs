pub mod gitlab;
pub mod local;
mod types;

pub use gitlab::GitLabProvider;
