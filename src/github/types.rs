use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Branch name used when the remote reports no default branch (empty repos).
pub const FALLBACK_DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub login: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

// GraphQL response types
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQLResponse {
    pub data: Option<GraphQLData>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQLError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQLData {
    pub viewer: Viewer,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Viewer {
    pub repositories: RepositoryConnection,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryConnection {
    pub nodes: Vec<RawRepo>,
    #[serde(rename = "pageInfo")]
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageInfo {
    #[serde(rename = "hasNextPage")]
    pub has_next_page: bool,
    #[serde(rename = "endCursor")]
    pub end_cursor: Option<String>,
}

/// One page of the viewer's repositories, as the API returned it.
#[derive(Debug, Clone)]
pub struct RepoPage {
    pub repos: Vec<RawRepo>,
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRepo {
    pub id: String,
    pub name: String,
    #[serde(rename = "nameWithOwner")]
    pub name_with_owner: String,
    pub owner: RawOwner,
    #[serde(rename = "defaultBranchRef")]
    pub default_branch_ref: Option<RawRef>,
    #[serde(rename = "pushedAt")]
    pub pushed_at: Option<DateTime<Utc>>,
    pub refs: Option<RawRefConnection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOwner {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRefConnection {
    pub nodes: Vec<RawBranch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBranch {
    pub name: String,
    // Empty object when the ref points at something other than a commit
    pub target: Option<RawCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCommit {
    #[serde(rename = "committedDate")]
    pub committed_date: Option<DateTime<Utc>>,
    pub author: Option<RawCommitAuthor>,
    #[serde(rename = "messageHeadline")]
    pub message_headline: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommitAuthor {
    pub name: Option<String>,
    pub user: Option<RawOwner>,
}

// Normalized types handed to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub default_branch: String,
    pub pushed_at: Option<DateTime<Utc>>,
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub name: String,
    pub is_default: bool,
    pub last_commit: LastCommit,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LastCommit {
    pub date: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub message: Option<String>,
}

impl From<RawRepo> for Repository {
    fn from(raw: RawRepo) -> Self {
        let default_branch = raw
            .default_branch_ref
            .map(|r| r.name)
            .unwrap_or_else(|| FALLBACK_DEFAULT_BRANCH.to_string());

        let branches = raw
            .refs
            .map(|refs| refs.nodes)
            .unwrap_or_default()
            .into_iter()
            .map(|b| Branch::from_raw(b, &default_branch))
            .collect();

        Self {
            id: raw.id,
            name: raw.name,
            full_name: raw.name_with_owner,
            owner: raw.owner.login,
            default_branch,
            pushed_at: raw.pushed_at,
            branches,
        }
    }
}

impl Branch {
    fn from_raw(raw: RawBranch, default_branch: &str) -> Self {
        let commit = raw.target.unwrap_or_default();
        // Prefer the linked account, fall back to the git author name
        let author = commit
            .author
            .and_then(|a| a.user.map(|u| u.login).or(a.name));

        Self {
            is_default: raw.name == default_branch,
            name: raw.name,
            last_commit: LastCommit {
                date: commit.committed_date,
                author,
                message: commit.message_headline,
            },
        }
    }
}

/// The merge commit GitHub created.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MergeResult {
    pub sha: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub commit: Option<MergeCommit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MergeCommit {
    pub message: String,
}
