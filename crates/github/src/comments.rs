use anyhow::{Context, Result};
use octocrab::models::CommentId;
use pages_action_core::models::CommentStatus;
use time::{OffsetDateTime, macros::format_description};

use crate::GitHub;

pub const COMMENTS_PER_PAGE: u8 = 100;

const HEADING: &str = "### ⚡️ Cloudflare Pages Deployment";
const TABLE_HEADER: [&str; 2] = [
    "| Name | Status | Preview | Last Commit | Updated (UTC) |",
    "| :--- | :----- | :------ | :---------- | :------------ |",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedComment {
    pub id: u64,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommentPage {
    pub comments: Vec<TrackedComment>,
    pub has_next: bool,
}

/// Issue comment operations used by [`reconcile`].
#[allow(async_fn_in_trait)]
pub trait IssueComments {
    /// Fetch one page of comments, 1-indexed, [`COMMENTS_PER_PAGE`] at a time.
    async fn list_comments(&self, issue_number: u64, page: u32) -> Result<CommentPage>;

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<TrackedComment>;

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<()>;
}

impl IssueComments for GitHub {
    async fn list_comments(&self, issue_number: u64, page: u32) -> Result<CommentPage> {
        let result = self
            .client
            .issues(&self.owner, &self.repo)
            .list_comments(issue_number)
            .per_page(COMMENTS_PER_PAGE)
            .page(page)
            .send()
            .await
            .with_context(|| format!("Failed to list comments for #{issue_number} (page {page})"))?;
        Ok(CommentPage {
            has_next: result.next.is_some(),
            comments: result
                .items
                .into_iter()
                .map(|c| TrackedComment { id: c.id.into_inner(), body: c.body.unwrap_or_default() })
                .collect(),
        })
    }

    async fn create_comment(&self, issue_number: u64, body: &str) -> Result<TrackedComment> {
        let comment = self
            .client
            .issues(&self.owner, &self.repo)
            .create_comment(issue_number, body)
            .await
            .with_context(|| format!("Failed to create comment on #{issue_number}"))?;
        Ok(TrackedComment { id: comment.id.into_inner(), body: comment.body.unwrap_or_default() })
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<()> {
        self.client
            .issues(&self.owner, &self.repo)
            .update_comment(CommentId(comment_id), body)
            .await
            .with_context(|| format!("Failed to update comment {comment_id}"))?;
        Ok(())
    }
}

/// Identifies the managed comment on a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentTarget {
    pub issue_number: u64,
    pub repo_name: String,
    pub project_name: String,
}

impl CommentTarget {
    /// Marker written into new comments. Scoped to the repository so several
    /// projects deployed from one repository share a single comment.
    pub fn marker(&self) -> String {
        format!("refined-cf-pages-action:deployment-summary:{}", self.repo_name)
    }

    /// Per-project marker used by older comments, still recognised when searching.
    pub fn legacy_marker(&self) -> String { format!("deployment-comment:{}", self.project_name) }

    fn matches(&self, body: &str) -> bool {
        body.contains(&self.marker()) || body.contains(&self.legacy_marker())
    }
}

/// One project's line in the comment table.
#[derive(Debug, Clone)]
pub struct CommentRow {
    pub project_name: String,
    pub status: CommentStatus,
    /// Markdown for the preview column, e.g. `[Visit Preview](https://...)`.
    pub preview: String,
    pub sha: String,
    pub run_url: String,
    pub updated: OffsetDateTime,
}

impl CommentRow {
    /// Prefix that identifies this project's row in an existing table.
    pub fn key(project_name: &str) -> String { format!("| **{project_name}** |") }

    pub fn render(&self) -> String {
        let updated = self
            .updated
            .to_offset(time::UtcOffset::UTC)
            .format(format_description!("[month repr:short] [day], [year] [hour]:[minute]"))
            .unwrap_or_default();
        let preview = if self.preview.is_empty() { "-" } else { self.preview.as_str() };
        format!(
            "{} {} ([View logs]({})) | {} | {} | {} |",
            Self::key(&self.project_name),
            self.status,
            self.run_url,
            preview,
            self.sha,
            updated
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    Replaced,
    Appended,
}

/// A comment body as an ordered list of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentBody {
    lines: Vec<String>,
}

impl CommentBody {
    /// A fresh body: marker, heading and an empty table.
    pub fn new(marker: &str) -> Self {
        let mut lines = vec![format!("<!-- {marker} -->"), HEADING.to_string(), String::new()];
        lines.extend(TABLE_HEADER.iter().map(|l| l.to_string()));
        Self { lines }
    }

    pub fn parse(body: &str) -> Self { Self { lines: body.lines().map(str::to_string).collect() } }

    pub fn lines(&self) -> &[String] { &self.lines }

    /// Replace the project's row in place, or add it after the last table line.
    pub fn upsert_row(&mut self, project_name: &str, row: String) -> RowChange {
        let key = CommentRow::key(project_name);
        if let Some(line) = self.lines.iter_mut().find(|l| l.contains(&key)) {
            *line = row;
            return RowChange::Replaced;
        }
        match self.lines.iter().rposition(|l| l.trim_start().starts_with('|')) {
            Some(idx) => self.lines.insert(idx + 1, row),
            None => {
                if self.lines.last().is_some_and(|l| !l.trim().is_empty()) {
                    self.lines.push(String::new());
                }
                self.lines.extend(TABLE_HEADER.iter().map(|l| l.to_string()));
                self.lines.push(row);
            }
        }
        RowChange::Appended
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Created(u64),
    Updated(u64, RowChange),
}

/// Scan comments page by page and return the first one carrying the target's marker.
pub async fn find_comment<C>(comments: &C, target: &CommentTarget) -> Result<Option<TrackedComment>>
where C: IssueComments {
    let mut page = 1;
    loop {
        let result = comments.list_comments(target.issue_number, page).await?;
        if let Some(found) = result.comments.into_iter().find(|c| target.matches(&c.body)) {
            return Ok(Some(found));
        }
        if !result.has_next {
            return Ok(None);
        }
        page += 1;
    }
}

/// Create or update the single managed comment so it holds `row` for the target project.
pub async fn reconcile<C>(comments: &C, target: &CommentTarget, row: &CommentRow) -> Result<Reconciled>
where C: IssueComments {
    match find_comment(comments, target).await? {
        Some(existing) => {
            let mut body = CommentBody::parse(&existing.body);
            let change = body.upsert_row(&target.project_name, row.render());
            comments.update_comment(existing.id, &body.render()).await?;
            tracing::info!("Updated comment {} on #{} ({:?})", existing.id, target.issue_number, change);
            Ok(Reconciled::Updated(existing.id, change))
        }
        None => {
            let mut body = CommentBody::new(&target.marker());
            body.upsert_row(&target.project_name, row.render());
            let created = comments.create_comment(target.issue_number, &body.render()).await?;
            tracing::info!("Created comment {} on #{}", created.id, target.issue_number);
            Ok(Reconciled::Created(created.id))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::macros::datetime;

    use super::*;

    /// In-memory issue with paginated comments.
    struct FakeIssue {
        per_page: usize,
        comments: Mutex<Vec<TrackedComment>>,
        pages_listed: Mutex<Vec<u32>>,
        next_id: Mutex<u64>,
    }

    impl FakeIssue {
        fn new(existing: Vec<&str>, per_page: usize) -> Self {
            let comments = existing
                .into_iter()
                .enumerate()
                .map(|(i, body)| TrackedComment { id: i as u64 + 1, body: body.to_string() })
                .collect::<Vec<_>>();
            let next_id = comments.len() as u64 + 1;
            Self {
                per_page,
                comments: Mutex::new(comments),
                pages_listed: Mutex::new(vec![]),
                next_id: Mutex::new(next_id),
            }
        }

        fn managed(&self) -> Vec<TrackedComment> {
            self.comments
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.body.contains("deployment-summary:site"))
                .cloned()
                .collect()
        }
    }

    impl IssueComments for FakeIssue {
        async fn list_comments(&self, _issue_number: u64, page: u32) -> Result<CommentPage> {
            self.pages_listed.lock().unwrap().push(page);
            let comments = self.comments.lock().unwrap();
            let start = (page as usize - 1) * self.per_page;
            let items = comments.iter().skip(start).take(self.per_page).cloned().collect();
            Ok(CommentPage { comments: items, has_next: start + self.per_page < comments.len() })
        }

        async fn create_comment(&self, _issue_number: u64, body: &str) -> Result<TrackedComment> {
            let mut next_id = self.next_id.lock().unwrap();
            let comment = TrackedComment { id: *next_id, body: body.to_string() };
            *next_id += 1;
            self.comments.lock().unwrap().push(comment.clone());
            Ok(comment)
        }

        async fn update_comment(&self, comment_id: u64, body: &str) -> Result<()> {
            let mut comments = self.comments.lock().unwrap();
            let comment = comments.iter_mut().find(|c| c.id == comment_id).context("missing")?;
            comment.body = body.to_string();
            Ok(())
        }
    }

    fn target(project_name: &str) -> CommentTarget {
        CommentTarget {
            issue_number: 7,
            repo_name: "site".to_string(),
            project_name: project_name.to_string(),
        }
    }

    fn row(project_name: &str, status: CommentStatus) -> CommentRow {
        CommentRow {
            project_name: project_name.to_string(),
            status,
            preview: match status {
                CommentStatus::Success => format!("[Visit Preview](https://{project_name}.pages.dev)"),
                _ => String::new(),
            },
            sha: "0123456".to_string(),
            run_url: "https://github.com/octo/site/actions/runs/1".to_string(),
            updated: datetime!(2024-05-01 12:30 UTC),
        }
    }

    fn rows_for(body: &str, project_name: &str) -> usize {
        let key = CommentRow::key(project_name);
        body.lines().filter(|l| l.contains(&key)).count()
    }

    #[test]
    fn test_row_render() {
        assert_eq!(
            row("alpha", CommentStatus::Success).render(),
            "| **alpha** | ✅ Ready ([View logs](https://github.com/octo/site/actions/runs/1)) | \
             [Visit Preview](https://alpha.pages.dev) | 0123456 | May 01, 2024 12:30 |"
        );
        assert!(row("alpha", CommentStatus::Building).render().contains("| - |"));
    }

    #[test]
    fn test_new_body() {
        let mut body = CommentBody::new("refined-cf-pages-action:deployment-summary:site");
        assert_eq!(body.upsert_row("alpha", "| **alpha** | x |".to_string()), RowChange::Appended);
        assert_eq!(body.lines()[0], "<!-- refined-cf-pages-action:deployment-summary:site -->");
        assert_eq!(body.lines().last().map(String::as_str), Some("| **alpha** | x |"));
        assert!(!body.lines().iter().any(|l| l.contains(&CommentRow::key("beta"))));
    }

    #[test]
    fn test_upsert_preserves_surrounding_lines() {
        let mut body = CommentBody::parse(
            "<!-- deployment-comment:alpha -->\n### Title\n\n| Name | Status |\n| :- | :- |\n\
             | **alpha** | old |\n\nFooter text\n",
        );
        assert_eq!(body.upsert_row("beta", "| **beta** | new |".to_string()), RowChange::Appended);
        assert_eq!(body.upsert_row("alpha", "| **alpha** | new |".to_string()), RowChange::Replaced);
        assert_eq!(
            body.render(),
            "<!-- deployment-comment:alpha -->\n### Title\n\n| Name | Status |\n| :- | :- |\n\
             | **alpha** | new |\n| **beta** | new |\n\nFooter text\n"
        );
    }

    #[test]
    fn test_upsert_without_table() {
        let mut body = CommentBody::parse("<!-- deployment-comment:alpha -->\nBuilding...");
        body.upsert_row("alpha", "| **alpha** | x |".to_string());
        assert_eq!(body.lines()[2], "");
        assert_eq!(body.lines()[3], TABLE_HEADER[0]);
        assert_eq!(body.lines()[5], "| **alpha** | x |");
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let issue = FakeIssue::new(vec!["Looks good!"], 100);
        let first = reconcile(&issue, &target("alpha"), &row("alpha", CommentStatus::Building))
            .await
            .unwrap();
        let second = reconcile(&issue, &target("alpha"), &row("alpha", CommentStatus::Success))
            .await
            .unwrap();
        assert_eq!(first, Reconciled::Created(2));
        assert_eq!(second, Reconciled::Updated(2, RowChange::Replaced));

        let managed = issue.managed();
        assert_eq!(managed.len(), 1);
        assert_eq!(rows_for(&managed[0].body, "alpha"), 1);
        assert!(managed[0].body.contains("✅ Ready"));
        assert!(!managed[0].body.contains("🔨 Building"));
    }

    #[tokio::test]
    async fn test_reconcile_multiple_projects() {
        let issue = FakeIssue::new(vec![], 100);
        reconcile(&issue, &target("alpha"), &row("alpha", CommentStatus::Building)).await.unwrap();
        reconcile(&issue, &target("beta"), &row("beta", CommentStatus::Success)).await.unwrap();
        let before = issue.managed()[0].body.clone();
        let beta_line = before.lines().find(|l| l.contains("| **beta** |")).unwrap().to_string();

        reconcile(&issue, &target("alpha"), &row("alpha", CommentStatus::Fail)).await.unwrap();
        let managed = issue.managed();
        assert_eq!(managed.len(), 1);
        let lines = managed[0].body.lines().collect::<Vec<_>>();
        let alpha_idx = lines.iter().position(|l| l.contains("| **alpha** |")).unwrap();
        let beta_idx = lines.iter().position(|l| l.contains("| **beta** |")).unwrap();
        assert!(alpha_idx < beta_idx);
        assert!(lines[alpha_idx].contains("❌ Failed"));
        assert_eq!(lines[beta_idx], beta_line);
        assert_eq!(rows_for(&managed[0].body, "alpha"), 1);
        assert_eq!(rows_for(&managed[0].body, "beta"), 1);
    }

    #[tokio::test]
    async fn test_find_comment_stops_at_first_match() {
        let marker = "<!-- refined-cf-pages-action:deployment-summary:site -->";
        let mut bodies = vec!["noise"; 150];
        bodies[120] = marker;
        bodies.push("noise");
        let issue = FakeIssue::new(bodies, 100);
        for _ in 0..100 {
            issue.comments.lock().unwrap().push(TrackedComment { id: 999, body: "x".into() });
        }
        let found = find_comment(&issue, &target("alpha")).await.unwrap().unwrap();
        assert_eq!(found.id, 121);
        assert_eq!(*issue.pages_listed.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_find_comment_legacy_marker() {
        let issue = FakeIssue::new(vec!["<!-- deployment-comment:alpha -->\nold"], 100);
        assert_eq!(find_comment(&issue, &target("alpha")).await.unwrap().map(|c| c.id), Some(1));
        assert_eq!(find_comment(&issue, &target("beta")).await.unwrap(), None);
    }
}
