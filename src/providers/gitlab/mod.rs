mod client;
mod links;
mod provider;
mod types;

pub use links::job_id_to_url;
pub use provider::GitLabProvider;
