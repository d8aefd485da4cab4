use crate::app::{App, InputMode, ListRow, PopupType, ToastKind};
use crate::github::{Branch, Repository};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Clear, Paragraph, Row, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Table, TableState,
    },
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Title bar
            Constraint::Min(0),    // Main content (table)
            Constraint::Length(1), // Status bar / toast
        ])
        .split(f.area());

    draw_title_bar(f, chunks[0], app);
    draw_repos_table(f, chunks[1], app);
    draw_status_bar(f, chunks[2], app);

    // Draw popups/input modes
    match app.input_mode {
        InputMode::ConfirmMerge | InputMode::ConfirmDelete => draw_confirm_popup(f, app),
        InputMode::Normal => {
            if let Some(ref popup) = app.popup {
                draw_popup(f, popup);
            }
        }
    }
}

fn draw_title_bar(f: &mut Frame, area: Rect, app: &App) {
    let branch_count: usize = app.repos.iter().map(|r| r.branches.len()).sum();

    let title = Line::from(vec![
        Span::styled(" ghbranch ", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
        Span::styled(app.login.clone(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" │ "),
        Span::styled(
            format!("{} repositories, {} branches", app.repos.len(), branch_count),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    f.render_widget(Paragraph::new(title), area);
}

fn draw_repos_table(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    f.render_widget(block, area);

    if app.repos.is_empty() {
        let message = if app.loading {
            "Loading repositories..."
        } else {
            "No repositories found. Press 'r' to refresh."
        };
        let empty = Paragraph::new(message).style(Style::default().fg(Color::DarkGray));
        f.render_widget(empty, inner);
        return;
    }

    // Column widths
    let widths = [
        Constraint::Length(34), // Repository / branch
        Constraint::Length(16), // Default branch / author
        Constraint::Length(9),  // Branch count
        Constraint::Length(12), // Pushed / committed
        Constraint::Min(20),    // Last commit message
    ];

    // Header
    let header = Row::new(vec![
        Cell::from("Repository").style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from("Default").style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from("Branches").style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from("Updated").style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from("Last commit").style(Style::default().add_modifier(Modifier::BOLD)),
    ])
    .style(Style::default().fg(Color::Cyan))
    .height(1);

    let rows: Vec<Row> = app
        .visible_rows()
        .into_iter()
        .map(|row| match row {
            ListRow::Repo(ri) => repo_row(app, &app.repos[ri]),
            ListRow::Branch(ri, bi) => branch_row(&app.repos[ri].branches[bi]),
        })
        .collect();

    let table = Table::new(rows, widths)
        .header(header)
        .row_highlight_style(Style::default().bg(Color::DarkGray));

    // Keeps the selection scrolled into view
    let mut state = TableState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(table, inner, &mut state);
}

fn repo_row<'a>(app: &App, repo: &Repository) -> Row<'a> {
    let marker = if app.expanded.contains(&repo.id) { "▾" } else { "▸" };

    Row::new(vec![
        Cell::from(Line::from(vec![
            Span::styled(format!("{} ", marker), Style::default().fg(Color::Cyan)),
            Span::styled(truncate(&repo.full_name, 31), Style::default().add_modifier(Modifier::BOLD)),
        ])),
        Cell::from(Span::styled(
            truncate(&repo.default_branch, 15),
            Style::default().fg(Color::Yellow),
        )),
        Cell::from(format!("{}", repo.branches.len())),
        Cell::from(Span::styled(
            format_age(repo.pushed_at),
            Style::default().fg(Color::DarkGray),
        )),
        Cell::from(""),
    ])
}

fn branch_row<'a>(branch: &Branch) -> Row<'a> {
    let (marker, name_style) = if branch.is_default {
        ("★ ", Style::default().fg(Color::Yellow))
    } else {
        ("  ", Style::default())
    };
    let commit = &branch.last_commit;

    Row::new(vec![
        Cell::from(Line::from(vec![
            Span::raw("    "),
            Span::styled(marker, Style::default().fg(Color::Yellow)),
            Span::styled(truncate(&branch.name, 27), name_style),
        ])),
        Cell::from(Span::styled(
            truncate(commit.author.as_deref().unwrap_or("—"), 15),
            Style::default().fg(Color::Magenta),
        )),
        Cell::from(""),
        Cell::from(Span::styled(
            format_age(commit.date),
            Style::default().fg(Color::DarkGray),
        )),
        Cell::from(truncate(commit.message.as_deref().unwrap_or(""), 60)),
    ])
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let status = if let Some(ref toast) = app.toast {
        let color = match toast.kind {
            ToastKind::Info => Color::Cyan,
            ToastKind::Success => Color::Green,
            ToastKind::Error => Color::Red,
        };
        Paragraph::new(toast.message.clone()).style(Style::default().fg(color))
    } else if app.loading {
        Paragraph::new("Refreshing...").style(Style::default().fg(Color::DarkGray))
    } else {
        Paragraph::new(get_status_bar_text(app)).style(Style::default().fg(Color::DarkGray))
    };
    f.render_widget(status, area);
}

fn get_status_bar_text(app: &App) -> String {
    if app.popup.is_some() {
        return "j/k: scroll │ Esc: close".to_string();
    }

    "j/k: nav │ Enter: expand │ m: merge │ d: delete │ r: refresh │ ?: help │ q: quit".to_string()
}

// Utility functions
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 1).collect();
        format!("{}…", truncated)
    }
}

fn format_age(when: Option<DateTime<Utc>>) -> String {
    let Some(when) = when else {
        return "—".to_string();
    };

    let age = Utc::now().signed_duration_since(when);
    if age.num_days() > 30 {
        when.format("%Y-%m-%d").to_string()
    } else if age.num_days() > 0 {
        format!("{}d ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn draw_popup(f: &mut Frame, popup: &crate::app::Popup) {
    let (width, height) = match popup.popup_type {
        PopupType::Help => (60, 70),
        PopupType::Details => (60, 50),
    };

    let area = centered_rect(width, height, f.area());
    f.render_widget(Clear, area);

    let title = match popup.popup_type {
        PopupType::Help => " Help ",
        PopupType::Details => " Branch ",
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner_area = block.inner(area);
    f.render_widget(block, area);

    // Calculate visible content with scroll
    let visible_height = inner_area.height as usize;
    let total_lines = popup.content.len();
    let scroll = popup.scroll.min(total_lines.saturating_sub(visible_height));

    let visible_content: Vec<Line> = popup
        .content
        .iter()
        .skip(scroll)
        .take(visible_height)
        .map(|s| {
            if popup.popup_type == PopupType::Help {
                help_line(s)
            } else {
                Line::from(s.clone())
            }
        })
        .collect();

    let paragraph = Paragraph::new(visible_content);
    f.render_widget(paragraph, inner_area);

    // Draw scrollbar if content overflows
    if total_lines > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight);
        let mut scrollbar_state = ScrollbarState::new(total_lines).position(scroll);

        f.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                horizontal: 0,
                vertical: 1,
            }),
            &mut scrollbar_state,
        );
    }
}

// "KEY|DESCRIPTION|COLOR" or "HEADER|Title"
fn help_line(s: &str) -> Line<'static> {
    let parts: Vec<&str> = s.split('|').collect();
    match parts.as_slice() {
        ["HEADER", title] => Line::from(Span::styled(
            title.to_string(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        [key, desc, color] => {
            let color = match *color {
                "cyan" => Color::Cyan,
                "magenta" => Color::Magenta,
                "yellow" => Color::Yellow,
                "green" => Color::Green,
                "red" => Color::Red,
                "blue" => Color::Blue,
                _ => Color::White,
            };
            Line::from(vec![
                Span::styled(format!("  {:<12}", key), Style::default().fg(color)),
                Span::raw(desc.to_string()),
            ])
        }
        _ => Line::from(s.to_string()),
    }
}

fn draw_confirm_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(50, 25, f.area());
    f.render_widget(Clear, area);

    let (title, color) = match app.input_mode {
        InputMode::ConfirmMerge => (" Confirm Merge ", Color::Green),
        _ => (" Confirm Delete ", Color::Red),
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
        ])
        .split(inner);

    let prompt = match (app.selected_branch(), &app.input_mode) {
        (Some((repo, branch)), InputMode::ConfirmMerge) => format!(
            "Merge '{}' into {} on {}? Type 'y' or 'yes':",
            branch.name, repo.default_branch, repo.full_name
        ),
        (Some((repo, branch)), _) => format!(
            "Delete branch '{}' from {}? Type 'y' or 'yes':",
            branch.name, repo.full_name
        ),
        (None, _) => "Type 'y' or 'yes' to confirm:".to_string(),
    };

    let warning = Paragraph::new(prompt)
        .style(Style::default().fg(color))
        .wrap(ratatui::widgets::Wrap { trim: true });
    f.render_widget(warning, chunks[0]);

    let input = Paragraph::new(app.confirm_buffer.as_str())
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(input, chunks[1]);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-branch-name", 8), "a-very-…");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(None), "—");
        assert_eq!(format_age(Some(Utc::now() - Duration::hours(3))), "3h ago");
        assert_eq!(format_age(Some(Utc::now() - Duration::days(2))), "2d ago");

        let old = Utc::now() - Duration::days(400);
        assert_eq!(format_age(Some(old)), old.format("%Y-%m-%d").to_string());
    }
}
