use crate::config::UiConfig;
use crate::github::{self, Branch, GitHubClient, GitHubError, Repository};
use crate::sync;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::info;

/// Outcome of a user-triggered operation, ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct OpResult {
    pub success: bool,
    pub error: Option<String>,
}

impl OpResult {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn err(error: String) -> Self {
        Self { success: false, error: Some(error) }
    }
}

impl<T> From<Result<T, GitHubError>> for OpResult {
    fn from(result: Result<T, GitHubError>) -> Self {
        match result {
            Ok(_) => OpResult::ok(),
            Err(e) => OpResult::err(github::user_message(&e)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    ConfirmMerge,
    ConfirmDelete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupType {
    Help,
    Details,
}

#[derive(Debug, Clone)]
pub struct Popup {
    pub popup_type: PopupType,
    pub scroll: usize,
    pub content: Vec<String>,
}

impl Popup {
    pub fn new(popup_type: PopupType, content: Vec<String>) -> Self {
        Self {
            popup_type,
            scroll: 0,
            content,
        }
    }

    pub fn scroll_down(&mut self, visible_lines: usize) {
        let max_scroll = self.content.len().saturating_sub(visible_lines);
        self.scroll = (self.scroll + 1).min(max_scroll);
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
    shown_at: Instant,
}

/// A line in the repository table: a repository, or one of its branches
/// when the repository is expanded
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListRow {
    Repo(usize),
    Branch(usize, usize),
}

pub struct App {
    client: GitHubClient,
    token: String,
    pub login: String,

    // Data
    pub repos: Vec<Repository>,
    pub expanded: HashSet<String>,
    expand_all: bool,

    // Selection
    pub selected: usize,

    // UI state
    pub loading: bool,
    pub toast: Option<Toast>,
    toast_ttl: Duration,
    pub input_mode: InputMode,
    pub popup: Option<Popup>,
    pub confirm_buffer: String,
}

impl App {
    pub fn new(client: GitHubClient, token: String, login: String, ui: &UiConfig) -> Self {
        Self {
            client,
            token,
            login,
            repos: Vec::new(),
            expanded: HashSet::new(),
            expand_all: ui.expand_all,
            selected: 0,
            loading: false,
            toast: None,
            toast_ttl: Duration::from_secs(ui.toast_secs),
            input_mode: InputMode::Normal,
            popup: None,
            confirm_buffer: String::new(),
        }
    }

    /// Reload every page. On failure the current list stays as it was.
    pub async fn refresh(&mut self) {
        self.loading = true;
        let result = sync::fetch_all_repositories(&self.client, &self.token).await;
        self.loading = false;

        match result {
            Ok(repos) => self.set_repos(repos),
            Err(e) => self.show_toast(github::user_message(&e), ToastKind::Error),
        }
    }

    pub fn set_repos(&mut self, repos: Vec<Repository>) {
        self.repos = repos;
        if self.expand_all {
            self.expanded = self.repos.iter().map(|r| r.id.clone()).collect();
        } else {
            // Forget repositories that disappeared
            let ids: HashSet<&str> = self.repos.iter().map(|r| r.id.as_str()).collect();
            self.expanded.retain(|id| ids.contains(id.as_str()));
        }
        self.clamp_selection();
    }

    pub fn visible_rows(&self) -> Vec<ListRow> {
        let mut rows = Vec::new();
        for (ri, repo) in self.repos.iter().enumerate() {
            rows.push(ListRow::Repo(ri));
            if self.expanded.contains(&repo.id) {
                rows.extend((0..repo.branches.len()).map(|bi| ListRow::Branch(ri, bi)));
            }
        }
        rows
    }

    fn clamp_selection(&mut self) {
        let max = self.visible_rows().len().saturating_sub(1);
        if self.selected > max {
            self.selected = max;
        }
    }

    pub fn next(&mut self) {
        let count = self.visible_rows().len();
        if count > 0 {
            self.selected = (self.selected + 1).min(count - 1);
        }
    }

    pub fn previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected_row(&self) -> Option<ListRow> {
        self.visible_rows().get(self.selected).copied()
    }

    pub fn selected_branch(&self) -> Option<(&Repository, &Branch)> {
        match self.selected_row()? {
            ListRow::Branch(ri, bi) => {
                let repo = self.repos.get(ri)?;
                Some((repo, repo.branches.get(bi)?))
            }
            ListRow::Repo(_) => None,
        }
    }

    pub fn toggle_repo(&mut self, repo_id: &str) {
        if !self.expanded.remove(repo_id) {
            self.expanded.insert(repo_id.to_string());
        }
        self.clamp_selection();
    }

    /// Enter on a repository expands/collapses it; on a branch shows details
    pub fn activate_selected(&mut self) {
        match self.selected_row() {
            Some(ListRow::Repo(ri)) => {
                let id = self.repos[ri].id.clone();
                self.toggle_repo(&id);
            }
            Some(ListRow::Branch(_, _)) => self.show_details(),
            None => {}
        }
    }

    pub fn show_details(&mut self) {
        let Some((repo, branch)) = self.selected_branch() else {
            return;
        };

        let commit = &branch.last_commit;
        let content = vec![
            format!("Repository: {}", repo.full_name),
            format!("Branch: {}", branch.name),
            format!("Default: {}", if branch.is_default { "yes" } else { "no" }),
            "".to_string(),
            "Last commit:".to_string(),
            format!(
                "  Date: {}",
                commit
                    .date
                    .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ),
            format!("  Author: {}", commit.author.as_deref().unwrap_or("unknown")),
            format!("  Message: {}", commit.message.as_deref().unwrap_or("")),
        ];
        self.popup = Some(Popup::new(PopupType::Details, content));
    }

    pub fn toggle_help(&mut self) {
        if self.popup.is_some() {
            self.popup = None;
        } else {
            self.popup = Some(Popup::new(PopupType::Help, get_help_content()));
        }
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
        self.input_mode = InputMode::Normal;
        self.confirm_buffer.clear();
    }

    pub fn scroll_down(&mut self) {
        if let Some(ref mut popup) = self.popup {
            popup.scroll_down(20);
        }
    }

    pub fn scroll_up(&mut self) {
        if let Some(ref mut popup) = self.popup {
            popup.scroll_up();
        }
    }

    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.toast = Some(Toast {
            message: message.into(),
            kind,
            shown_at: Instant::now(),
        });
    }

    /// Drop the toast once it has been visible long enough
    pub fn tick(&mut self) {
        if let Some(ref toast) = self.toast {
            if toast.shown_at.elapsed() >= self.toast_ttl {
                self.toast = None;
            }
        }
    }

    pub fn start_merge_confirm(&mut self) {
        match self.selected_branch() {
            Some((_, branch)) if branch.is_default => {
                self.show_toast("Select a non-default branch to merge.", ToastKind::Info)
            }
            Some(_) => {
                self.input_mode = InputMode::ConfirmMerge;
                self.confirm_buffer.clear();
            }
            None => {}
        }
    }

    pub fn start_delete_confirm(&mut self) {
        match self.selected_branch() {
            Some((_, branch)) if branch.is_default => {
                self.show_toast("The default branch cannot be deleted.", ToastKind::Info)
            }
            Some(_) => {
                self.input_mode = InputMode::ConfirmDelete;
                self.confirm_buffer.clear();
            }
            None => {}
        }
    }

    fn confirmed(&self) -> bool {
        let answer = self.confirm_buffer.trim().to_lowercase();
        answer == "y" || answer == "yes"
    }

    /// Merge the selected branch into its repository's default branch
    pub async fn merge_selected(&mut self) -> OpResult {
        if !self.confirmed() {
            self.close_popup();
            return OpResult::ok();
        }

        let Some((owner, repo, head, base)) = self.selected_branch().map(|(r, b)| {
            (r.owner.clone(), r.name.clone(), b.name.clone(), r.default_branch.clone())
        }) else {
            self.close_popup();
            return OpResult::ok();
        };

        self.close_popup();
        let result: OpResult = self
            .client
            .merge_branch(&self.token, &owner, &repo, &head, &base)
            .await
            .into();

        self.report(result, format!("Merged '{}' into {}", head, base)).await
    }

    pub async fn delete_selected(&mut self) -> OpResult {
        if !self.confirmed() {
            self.close_popup();
            return OpResult::ok();
        }

        let Some((owner, repo, branch)) = self
            .selected_branch()
            .map(|(r, b)| (r.owner.clone(), r.name.clone(), b.name.clone()))
        else {
            self.close_popup();
            return OpResult::ok();
        };

        self.close_popup();
        let result: OpResult = self
            .client
            .delete_branch(&self.token, &owner, &repo, &branch)
            .await
            .into();

        self.report(result, format!("Deleted branch '{}'", branch)).await
    }

    async fn report(&mut self, result: OpResult, success_message: String) -> OpResult {
        match &result.error {
            None => {
                info!("{}", success_message);
                self.show_toast(success_message, ToastKind::Success);
                self.refresh().await;
            }
            Some(error) => self.show_toast(error.clone(), ToastKind::Error),
        }
        result
    }

    pub fn handle_char(&mut self, c: char) {
        if self.input_mode != InputMode::Normal {
            self.confirm_buffer.push(c);
        }
    }

    pub fn handle_backspace(&mut self) {
        if self.input_mode != InputMode::Normal {
            self.confirm_buffer.pop();
        }
    }
}

// Help content lines - format: "KEY|DESCRIPTION|COLOR" where COLOR is optional
// Colors: cyan, magenta, yellow, green, red, blue
pub fn get_help_content() -> Vec<String> {
    vec![
        "HEADER|Navigation".to_string(),
        "j/↓|Move down|".to_string(),
        "k/↑|Move up|".to_string(),
        "Enter/Space|Expand repository / branch details|".to_string(),
        "r|Refresh all|".to_string(),
        "".to_string(),
        "HEADER|Branch Actions".to_string(),
        "m|Merge into default branch|green".to_string(),
        "d|Delete branch|red".to_string(),
        "".to_string(),
        "HEADER|Markers".to_string(),
        "★|Default branch|yellow".to_string(),
        "▸/▾|Collapsed / expanded|cyan".to_string(),
        "".to_string(),
        "|Press ? or Esc to close|".to_string(),
    ]
}
