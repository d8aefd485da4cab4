use super::error::GitHubError;
use super::types::{GraphQLResponse, MergeResult, RepoPage, UserIdentity};
use crate::config::GitHubConfig;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("ghbranch/", env!("CARGO_PKG_VERSION"));
const REST_ACCEPT: &str = "application/vnd.github.v3+json";

const REPOSITORIES_QUERY: &str = r#"
query($cursor: String) {
  viewer {
    repositories(first: 50, after: $cursor, orderBy: {field: PUSHED_AT, direction: DESC}) {
      nodes {
        id
        name
        nameWithOwner
        owner { login }
        defaultBranchRef { name }
        pushedAt
        refs(refPrefix: "refs/heads/", first: 100) {
          nodes {
            name
            target {
              ... on Commit {
                committedDate
                author {
                  name
                  user { login }
                }
                messageHeadline
              }
            }
          }
        }
      }
      pageInfo {
        hasNextPage
        endCursor
      }
    }
  }
}
"#;

// Error bodies from the REST API
#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: Option<String>,
}

#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: Url,
    graphql_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let api_url = Url::parse(&config.api_url)
            .map_err(|e| GitHubError::InvalidUrl(format!("{} ({})", config.api_url, e)))?;
        if api_url.cannot_be_a_base() {
            return Err(GitHubError::InvalidUrl(config.api_url.clone()));
        }

        Ok(Self {
            http,
            api_url,
            graphql_url: config.graphql_url.clone(),
        })
    }

    /// The underlying HTTP client, shared with the OAuth code exchange.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// REST endpoint under the API base. Each segment is percent-encoded, so
    /// characters such as `#` or `%` in a branch name stay part of the path.
    fn endpoint<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.api_url.clone();
        // Checked in `new`: the base can always take path segments
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn rest(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .header("Authorization", format!("token {}", token))
            .header("Accept", REST_ACCEPT)
    }

    pub async fn get_identity(&self, token: &str) -> Result<UserIdentity, GitHubError> {
        let url = self.endpoint(["user"]);
        let response = self.rest(self.http.get(url), token).send().await?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "identity request rejected");
            return Err(GitHubError::Auth);
        }

        Ok(response.json::<UserIdentity>().await?)
    }

    /// Fetch one page of the viewer's repositories, most recently pushed first.
    pub async fn list_repositories_page(
        &self,
        token: &str,
        cursor: Option<&str>,
    ) -> Result<RepoPage, GitHubError> {
        let body = json!({
            "query": REPOSITORIES_QUERY,
            "variables": { "cursor": cursor },
        });

        let response = self
            .http
            .post(&self.graphql_url)
            .header("Authorization", format!("bearer {}", token))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let message = error_message(response, "Failed to fetch repositories").await;
            return Err(GitHubError::Api(message));
        }

        let parsed: GraphQLResponse = response.json().await?;

        if let Some(first) = parsed.errors.and_then(|errs| errs.into_iter().next()) {
            return Err(GitHubError::Query(first.message));
        }

        let data = parsed
            .data
            .ok_or_else(|| GitHubError::Query("No data in GraphQL response".to_string()))?;
        let connection = data.viewer.repositories;

        debug!(
            count = connection.nodes.len(),
            has_next_page = connection.page_info.has_next_page,
            "fetched repository page"
        );

        Ok(RepoPage {
            repos: connection.nodes,
            page_info: connection.page_info,
        })
    }

    pub async fn merge_branch(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        head: &str,
        base: &str,
    ) -> Result<MergeResult, GitHubError> {
        let url = self.endpoint(["repos", owner, repo, "merges"]);
        let body = json!({
            "base": base,
            "head": head,
            "commit_message": merge_commit_message(head, base),
        });

        let response = self.rest(self.http.post(url), token).json(&body).send().await?;

        match response.status() {
            // GitHub answers 204 when base already contains head
            StatusCode::NO_CONTENT => Err(GitHubError::NothingToMerge),
            StatusCode::CONFLICT => Err(GitHubError::Conflict),
            status if status.is_success() => Ok(response.json::<MergeResult>().await?),
            _ => Err(GitHubError::Api(
                error_message(response, "Failed to merge branch").await,
            )),
        }
    }

    pub async fn delete_branch(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<(), GitHubError> {
        // Slashes in a branch name are ref path separators, everything else is literal
        let url = self.endpoint(
            ["repos", owner, repo, "git", "refs", "heads"]
                .into_iter()
                .chain(branch.split('/')),
        );

        let response = self.rest(self.http.delete(url), token).send().await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNPROCESSABLE_ENTITY => Err(GitHubError::ProtectedBranch),
            _ => Err(GitHubError::Api(
                error_message(response, "Failed to delete branch").await,
            )),
        }
    }
}

pub fn merge_commit_message(head: &str, base: &str) -> String {
    format!("Merge branch '{}' into {}", head, base)
}

/// Best-effort read of `{"message": ...}`; anything unparseable yields `default`.
async fn error_message(response: Response, default: &str) -> String {
    response
        .json::<ApiMessage>()
        .await
        .ok()
        .and_then(|m| m.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client_for(server: &MockServer) -> GitHubClient {
        let config = GitHubConfig {
            api_url: server.uri(),
            graphql_url: format!("{}/graphql", server.uri()),
            request_timeout_secs: 5,
        };
        GitHubClient::new(&config).expect("client")
    }

    fn page_body(names: &[&str], has_next_page: bool, end_cursor: Option<&str>) -> serde_json::Value {
        let nodes: Vec<serde_json::Value> = names
            .iter()
            .map(|name| {
                json!({
                    "id": format!("R_{}", name),
                    "name": name,
                    "nameWithOwner": format!("octo/{}", name),
                    "owner": { "login": "octo" },
                    "defaultBranchRef": { "name": "main" },
                    "pushedAt": "2024-01-01T00:00:00Z",
                    "refs": { "nodes": [] }
                })
            })
            .collect();

        json!({
            "data": { "viewer": { "repositories": {
                "nodes": nodes,
                "pageInfo": { "hasNextPage": has_next_page, "endCursor": end_cursor }
            }}}
        })
    }

    #[test]
    fn test_merge_commit_message() {
        assert_eq!(
            merge_commit_message("feature/login", "main"),
            "Merge branch 'feature/login' into main"
        );
    }

    #[tokio::test]
    async fn test_get_identity_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "token good-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "octocat",
                "id": 1,
                "name": "The Octocat"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user = client_for(&server).get_identity("good-token").await.expect("identity");
        assert_eq!(user.login, "octocat");
        assert_eq!(user.name.as_deref(), Some("The Octocat"));
    }

    #[tokio::test]
    async fn test_get_identity_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).get_identity("bad").await.unwrap_err();
        assert!(matches!(err, GitHubError::Auth));
    }

    #[tokio::test]
    async fn test_list_page_sends_cursor_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "bearer tok"))
            .respond_with(|req: &Request| {
                let body: serde_json::Value =
                    serde_json::from_slice(&req.body).unwrap_or_default();
                let ordered = body["query"].as_str().unwrap_or_default().contains("PUSHED_AT");
                if body["variables"]["cursor"] == "c1" && ordered {
                    ResponseTemplate::new(200).set_body_json(page_body(&["a"], false, None))
                } else {
                    ResponseTemplate::new(400)
                }
            })
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .list_repositories_page("tok", Some("c1"))
            .await
            .expect("page");
        assert_eq!(page.repos.len(), 1);
        assert!(!page.page_info.has_next_page);
    }

    #[tokio::test]
    async fn test_list_page_query_error_surfaces_first_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [
                    { "message": "Something went wrong while executing your query." },
                    { "message": "second" }
                ]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).list_repositories_page("tok", None).await.unwrap_err();
        match err {
            GitHubError::Query(msg) => {
                assert_eq!(msg, "Something went wrong while executing your query.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_page_http_failure_uses_remote_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "message": "API rate limit exceeded" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).list_repositories_page("tok", None).await.unwrap_err();
        assert!(matches!(&err, GitHubError::Api(msg) if msg == "API rate limit exceeded"));
        assert!(crate::github::is_rate_limited(&err));
    }

    #[tokio::test]
    async fn test_merge_branch_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/widgets/merges"))
            .and(header("authorization", "token tok"))
            .and(body_json(json!({
                "base": "main",
                "head": "feature",
                "commit_message": "Merge branch 'feature' into main"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "sha": "abc123",
                "html_url": "https://github.com/octo/widgets/commit/abc123",
                "commit": { "message": "Merge branch 'feature' into main" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .merge_branch("tok", "octo", "widgets", "feature", "main")
            .await
            .expect("merge");
        assert_eq!(result.sha, "abc123");
    }

    #[tokio::test]
    async fn test_merge_branch_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/conflict/merges"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "message": "Merge conflict" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/noop/merges"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/missing/merges"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Base does not exist" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/broken/merges"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server);

        let err = client.merge_branch("tok", "octo", "conflict", "f", "main").await.unwrap_err();
        assert!(matches!(err, GitHubError::Conflict));

        let err = client.merge_branch("tok", "octo", "noop", "f", "main").await.unwrap_err();
        assert!(matches!(err, GitHubError::NothingToMerge));

        let err = client.merge_branch("tok", "octo", "missing", "f", "main").await.unwrap_err();
        assert!(matches!(&err, GitHubError::Api(msg) if msg == "Base does not exist"));

        let err = client.merge_branch("tok", "octo", "broken", "f", "main").await.unwrap_err();
        assert!(matches!(&err, GitHubError::Api(msg) if msg == "Failed to merge branch"));
    }

    #[tokio::test]
    async fn test_delete_branch_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octo/widgets/git/refs/heads/feature/old"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octo/widgets/git/refs/heads/main"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "message": "Reference update failed" })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octo/widgets/git/refs/heads/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Reference does not exist" })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octo/widgets/git/refs/heads/garbled"))
            .respond_with(ResponseTemplate::new(500).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);

        client
            .delete_branch("tok", "octo", "widgets", "feature/old")
            .await
            .expect("delete");

        let err = client.delete_branch("tok", "octo", "widgets", "main").await.unwrap_err();
        assert!(matches!(err, GitHubError::ProtectedBranch));

        let err = client.delete_branch("tok", "octo", "widgets", "gone").await.unwrap_err();
        assert!(matches!(&err, GitHubError::Api(msg) if msg == "Reference does not exist"));

        let err = client.delete_branch("tok", "octo", "widgets", "garbled").await.unwrap_err();
        assert!(matches!(&err, GitHubError::Api(msg) if msg == "Failed to delete branch"));
    }

    #[tokio::test]
    async fn test_delete_branch_encodes_reserved_characters() {
        let server = MockServer::start().await;
        // Truncating at '#' would hit this ref instead
        Mock::given(method("DELETE"))
            .and(path("/repos/octo/widgets/git/refs/heads/feat"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octo/widgets/git/refs/heads/feat%231"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octo/widgets/git/refs/heads/fix/100%25"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .delete_branch("tok", "octo", "widgets", "feat#1")
            .await
            .expect("delete feat#1");
        client
            .delete_branch("tok", "octo", "widgets", "fix/100%")
            .await
            .expect("delete fix/100%");
    }

    #[test]
    fn test_new_rejects_unusable_api_url() {
        let config = GitHubConfig {
            api_url: "not a url".to_string(),
            ..GitHubConfig::default()
        };
        assert!(matches!(GitHubClient::new(&config), Err(GitHubError::InvalidUrl(_))));

        let config = GitHubConfig {
            api_url: "mailto:octo@example.com".to_string(),
            ..GitHubConfig::default()
        };
        assert!(matches!(GitHubClient::new(&config), Err(GitHubError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_api_url_with_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "octocat" })))
            .expect(1)
            .mount(&server)
            .await;

        let config = GitHubConfig {
            api_url: format!("{}/api/v3/", server.uri()),
            graphql_url: format!("{}/api/graphql", server.uri()),
            request_timeout_secs: 5,
        };
        let user = GitHubClient::new(&config)
            .expect("client")
            .get_identity("tok")
            .await
            .expect("identity");
        assert_eq!(user.login, "octocat");
    }
}
