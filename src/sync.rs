use crate::github::{GitHubClient, GitHubError, RawRepo, Repository};
use tracing::{debug, info};

/// Walk every page of the viewer's repositories and normalize the result.
///
/// Pages are fetched one after another since each cursor comes from the
/// previous response. A failing page aborts the whole walk: callers get
/// either the complete list or that page's error, never a partial list.
pub async fn fetch_all_repositories(
    client: &GitHubClient,
    token: &str,
) -> Result<Vec<Repository>, GitHubError> {
    let mut all_repos: Vec<RawRepo> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = client.list_repositories_page(token, cursor.as_deref()).await?;
        pages += 1;
        all_repos.extend(page.repos);
        debug!(page = pages, total_so_far = all_repos.len(), "accumulated page");

        if !page.page_info.has_next_page {
            break;
        }

        // Restarting from the top would loop forever
        match page.page_info.end_cursor {
            Some(next) => cursor = Some(next),
            None => {
                return Err(GitHubError::Query(
                    "Pagination cursor missing from a page that has a next page".to_string(),
                ))
            }
        }
    }

    info!(repositories = all_repos.len(), pages, "fetched all repositories");
    Ok(all_repos.into_iter().map(Repository::from).collect())
}
