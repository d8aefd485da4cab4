//! GitHub API access: identity, the paginated repository query and the
//! branch merge/delete mutations.

mod client;
mod error;
mod types;

pub use client::{merge_commit_message, GitHubClient};
pub use error::{is_rate_limited, rate_limit_hint, user_message, GitHubError};
pub use types::{
    Branch, LastCommit, MergeResult, PageInfo, RawRepo, RepoPage, Repository, UserIdentity,
    FALLBACK_DEFAULT_BRANCH,
};
