use crate::auth::AuthFlow;
use crate::config::Config;
use crate::github::{self, GitHubClient, GitHubError, Repository};
use crate::session::Session;
use crate::store::FileStore;
use crate::sync;
use anyhow::{anyhow, bail, Context as _, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Everything a command needs: configuration, the API client and the session
pub struct Context {
    pub config: Config,
    pub client: GitHubClient,
    pub session: Session,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(FileStore::new(config.state_path()));
        let session = Session::load(store).context("Failed to load saved session")?;
        let client = GitHubClient::new(&config.github)?;
        Ok(Self {
            config,
            client,
            session,
        })
    }

    pub fn auth(&self) -> AuthFlow<'_> {
        AuthFlow::new(&self.client, &self.session, &self.config.oauth)
    }

    /// Validate the saved token and return it
    pub async fn require_token(&self) -> Result<String> {
        if !self.auth().init().await {
            bail!("Not authenticated. Run `ghbranch login` first.");
        }
        self.session
            .token()
            .ok_or_else(|| anyhow!("Not authenticated. Run `ghbranch login` first."))
    }
}

fn api_error(e: GitHubError) -> anyhow::Error {
    anyhow!(github::user_message(&e))
}

async fn read_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}

pub async fn login(ctx: &Context, token: Option<String>, oauth: bool) -> Result<()> {
    let mut flow = ctx.auth();

    let user = if oauth {
        let url = flow.begin_oauth()?;
        eprintln!("Open this URL in your browser and authorize ghbranch:\n\n  {}\n", url);
        let callback = read_line("Paste the URL you were redirected to: ").await?;
        flow.handle_callback_url(&callback).await?
    } else {
        let token = match token {
            Some(token) => token,
            None => read_line("Personal access token: ").await?,
        };
        flow.login_with_token(&token).await?
    };

    println!("Logged in as {}", user.login);
    Ok(())
}

/// Complete an OAuth flow started by `login --oauth` in another process
pub async fn callback(ctx: &Context, url: &str) -> Result<()> {
    let user = ctx.auth().handle_callback_url(url).await?;
    println!("Logged in as {}", user.login);
    Ok(())
}

pub fn logout(ctx: &Context) -> Result<()> {
    ctx.auth().logout()?;
    println!("Logged out");
    Ok(())
}

pub async fn whoami(ctx: &Context) -> Result<()> {
    ctx.require_token().await?;
    let user = ctx
        .session
        .user()
        .ok_or_else(|| anyhow!("Not authenticated. Run `ghbranch login` first."))?;

    match user.name {
        Some(name) => println!("{} ({})", user.login, name),
        None => println!("{}", user.login),
    }
    Ok(())
}

pub async fn list(ctx: &Context, json: bool) -> Result<()> {
    let token = ctx.require_token().await?;
    let repos = sync::fetch_all_repositories(&ctx.client, &token)
        .await
        .map_err(api_error)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&repos)?);
    } else {
        print!("{}", format_listing(&repos));
    }
    Ok(())
}

pub async fn merge(ctx: &Context, repo: &str, head: &str, base: &str) -> Result<()> {
    let (owner, name) = split_repo(repo)?;
    let token = ctx.require_token().await?;

    let result = ctx
        .client
        .merge_branch(&token, owner, name, head, base)
        .await
        .map_err(api_error)?;

    println!("Merged '{}' into {} ({})", head, base, short_sha(&result.sha));
    Ok(())
}

pub async fn delete(ctx: &Context, repo: &str, branch: &str) -> Result<()> {
    let (owner, name) = split_repo(repo)?;
    let token = ctx.require_token().await?;

    ctx.client
        .delete_branch(&token, owner, name, branch)
        .await
        .map_err(api_error)?;

    println!("Deleted branch '{}' from {}", branch, repo);
    Ok(())
}

fn split_repo(repo: &str) -> Result<(&str, &str)> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => bail!("Expected a repository as owner/name, got '{}'", repo),
    }
}

fn short_sha(sha: &str) -> &str {
    &sha[..7.min(sha.len())]
}

fn format_listing(repos: &[Repository]) -> String {
    let mut out = String::new();
    for repo in repos {
        let pushed = repo
            .pushed_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());
        out.push_str(&format!(
            "{} (default: {}, pushed {})\n",
            repo.full_name, repo.default_branch, pushed
        ));

        for branch in &repo.branches {
            let commit = &branch.last_commit;
            out.push_str(&format!(
                "  {} {:<30} {:<10} {:<16} {}\n",
                if branch.is_default { "*" } else { " " },
                branch.name,
                commit
                    .date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                commit.author.as_deref().unwrap_or(""),
                commit.message.as_deref().unwrap_or(""),
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{Branch, LastCommit};

    #[test]
    fn test_split_repo() {
        assert_eq!(split_repo("octo/widgets").expect("split"), ("octo", "widgets"));
        assert!(split_repo("widgets").is_err());
        assert!(split_repo("/widgets").is_err());
        assert!(split_repo("octo/").is_err());
        assert!(split_repo("octo/widgets/extra").is_err());
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha("0123456789abcdef"), "0123456");
        assert_eq!(short_sha("abc"), "abc");
    }

    #[test]
    fn test_format_listing_marks_default() {
        let repos = vec![Repository {
            id: "R_1".to_string(),
            name: "widgets".to_string(),
            full_name: "octo/widgets".to_string(),
            owner: "octo".to_string(),
            default_branch: "main".to_string(),
            pushed_at: None,
            branches: vec![
                Branch {
                    name: "main".to_string(),
                    is_default: true,
                    last_commit: LastCommit {
                        date: None,
                        author: Some("jdoe".to_string()),
                        message: Some("Initial commit".to_string()),
                    },
                },
                Branch {
                    name: "feature".to_string(),
                    is_default: false,
                    last_commit: LastCommit::default(),
                },
            ],
        }];

        let listing = format_listing(&repos);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "octo/widgets (default: main, pushed never)");
        assert!(lines[1].starts_with("  * main"));
        assert!(lines[1].contains("Initial commit"));
        assert!(lines[2].starts_with("    feature"));
    }
}
