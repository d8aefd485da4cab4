use thiserror::Error;

/// Errors that can occur when talking to the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The token was rejected by the identity endpoint.
    #[error("Failed to authenticate. Please check your token.")]
    Auth,

    /// Transport-level failure (connection, timeout, undecodable body).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The GraphQL endpoint answered with an `errors` array.
    #[error("{0}")]
    Query(String),

    /// The configured API base cannot be used to build request URLs.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Any other failure GitHub reported, with its message.
    #[error("{0}")]
    Api(String),

    #[error("Merge conflict. Please merge manually on GitHub.")]
    Conflict,

    #[error("Already merged or nothing to merge.")]
    NothingToMerge,

    #[error("Branch is protected and cannot be deleted.")]
    ProtectedBranch,
}

/// Whether an error looks like GitHub's rate limiting.
///
/// This is a heuristic on the message text only. The `x-ratelimit-*` response
/// headers are not inspected, so a rate-limited response whose body does not
/// mention it goes undetected.
pub fn is_rate_limited(error: &GitHubError) -> bool {
    error.to_string().to_lowercase().contains("rate limit")
}

/// Advice shown next to a rate-limit failure. The reset time is not known.
pub fn rate_limit_hint(_error: &GitHubError) -> &'static str {
    "Please try again in a few minutes."
}

/// User-facing message, with the rate-limit hint appended when it applies.
pub fn user_message(error: &GitHubError) -> String {
    if is_rate_limited(error) {
        format!("Rate limit exceeded. {}", rate_limit_hint(error))
    } else {
        error.to_string()
    }
}
