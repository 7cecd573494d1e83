//! Version control adapters.

pub mod git_cli;
pub mod github;
pub mod mock;

pub use git_cli::GitCliAdapter;
pub use github::GitHubPullRequestClient;
pub use mock::{MockVcsAdapter, VcsCall};
