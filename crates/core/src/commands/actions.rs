// Built-in custom command actions over the memory bank

use super::registry::{ActionContext, TypedAction};
use crate::error::CacdError;
use crate::memory_bank::{
    ARCHIVE_DIR, CHANGELOG_FILE, KNOWLEDGE_PACKAGES_DIR, SYSTEM_PATTERNS_FILE, TASKS_DIR,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STATUS_MARKER: &str = "Status:";
const REVIEW_WINDOW: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct NoInput {}

pub struct Echo;

#[derive(Debug, Deserialize)]
pub struct EchoInput {
    pub msg: Value,
}

#[derive(Debug, Serialize)]
pub struct EchoOutput {
    pub echo: Value,
}

impl TypedAction for Echo {
    const NAME: &'static str = "echo_action";
    type Input = EchoInput;
    type Output = EchoOutput;

    fn run(&self, _ctx: &ActionContext<'_>, input: EchoInput) -> Result<EchoOutput> {
        Ok(EchoOutput { echo: input.msg })
    }
}

/// Moves `knowledge_packages/<file>` to `archive/<file>`
pub struct ArchiveKnowledgePackage;

#[derive(Debug, Deserialize)]
pub struct FileInput {
    pub file: String,
}

#[derive(Debug, Serialize)]
pub struct ArchivedOutput {
    pub archived: String,
}

impl TypedAction for ArchiveKnowledgePackage {
    const NAME: &'static str = "archive_knowledge_package_action";
    type Input = FileInput;
    type Output = ArchivedOutput;

    fn run(&self, ctx: &ActionContext<'_>, input: FileInput) -> Result<ArchivedOutput> {
        let src = ctx
            .bank
            .path(&format!("{}/{}", KNOWLEDGE_PACKAGES_DIR, input.file))?;
        let dst = ctx.bank.path(&format!("{}/{}", ARCHIVE_DIR, input.file))?;
        if !src.is_file() {
            return Err(CacdError::not_found(format!("knowledge package {}", input.file)).into());
        }
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::rename(&src, &dst)
            .with_context(|| format!("Failed to move {} to archive", input.file))?;
        Ok(ArchivedOutput {
            archived: input.file,
        })
    }
}

/// Knowledge packages whose content contains a keyword
pub struct SearchKnowledge;

#[derive(Debug, Deserialize)]
pub struct KeywordInput {
    pub keyword: String,
}

#[derive(Debug, Serialize)]
pub struct FoundOutput {
    pub found: Vec<String>,
}

impl TypedAction for SearchKnowledge {
    const NAME: &'static str = "search_knowledge_action";
    type Input = KeywordInput;
    type Output = FoundOutput;

    fn run(&self, ctx: &ActionContext<'_>, input: KeywordInput) -> Result<FoundOutput> {
        let mut found = Vec::new();
        for name in ctx.bank.list_files(KNOWLEDGE_PACKAGES_DIR)? {
            let path = ctx.bank.path(&format!("{}/{}", KNOWLEDGE_PACKAGES_DIR, name))?;
            let data = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if String::from_utf8_lossy(&data).contains(&input.keyword) {
                found.push(name);
            }
        }
        Ok(FoundOutput { found })
    }
}

/// Rewrites the status line of task files
pub struct BatchUpdateStatus;

#[derive(Debug, Deserialize)]
pub struct BatchStatusInput {
    pub files: Vec<String>,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct UpdatedOutput {
    pub updated: Vec<String>,
}

impl TypedAction for BatchUpdateStatus {
    const NAME: &'static str = "batch_update_status_action";
    type Input = BatchStatusInput;
    type Output = UpdatedOutput;

    fn run(&self, ctx: &ActionContext<'_>, input: BatchStatusInput) -> Result<UpdatedOutput> {
        let mut updated = Vec::new();
        for file in input.files {
            let relative = format!("{}/{}", TASKS_DIR, file);
            if !ctx.bank.path(&relative)?.is_file() {
                continue;
            }
            let content = ctx.bank.read_text(&relative)?;
            ctx.bank
                .write_text(&relative, &set_status(&content, &input.status))?;
            updated.push(file);
        }
        Ok(UpdatedOutput { updated })
    }
}

/// Every `Status:` marker gets `status` up to the end of its line; without a
/// marker a status line is appended
pub fn set_status(content: &str, status: &str) -> String {
    if !content.contains(STATUS_MARKER) {
        return format!("{}\n{} {}\n", content, STATUS_MARKER, status);
    }

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find(STATUS_MARKER) {
        out.push_str(&rest[..start]);
        out.push_str(STATUS_MARKER);
        out.push(' ');
        out.push_str(status);
        let after = &rest[start..];
        rest = match after.find('\n') {
            Some(end) => &after[end..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Lists the knowledge packages
pub struct GenerateReport;

#[derive(Debug, Serialize)]
pub struct ReportOutput {
    pub report: Vec<String>,
}

impl TypedAction for GenerateReport {
    const NAME: &'static str = "generate_report_action";
    type Input = NoInput;
    type Output = ReportOutput;

    fn run(&self, ctx: &ActionContext<'_>, _input: NoInput) -> Result<ReportOutput> {
        let report = ctx
            .bank
            .list_files(KNOWLEDGE_PACKAGES_DIR)?
            .into_iter()
            .map(|name| format!("Knowledge: {}", name))
            .collect();
        Ok(ReportOutput { report })
    }
}

/// Splits changelog lines into features and anomalies
pub struct AnalyzeChangelog;

#[derive(Debug, Serialize)]
pub struct ChangelogAnalysis {
    pub summary: Vec<String>,
    pub anomalies: Vec<String>,
}

impl TypedAction for AnalyzeChangelog {
    const NAME: &'static str = "analyze_changelog_action";
    type Input = NoInput;
    type Output = ChangelogAnalysis;

    fn run(&self, ctx: &ActionContext<'_>, _input: NoInput) -> Result<ChangelogAnalysis> {
        let changelog = ctx.bank.read_text(CHANGELOG_FILE)?;
        let mut analysis = ChangelogAnalysis {
            summary: Vec::new(),
            anomalies: Vec::new(),
        };
        for line in changelog.lines() {
            if line.contains("fix:") || line.to_lowercase().contains("error") {
                analysis.anomalies.push(line.trim().to_string());
            }
            if line.contains("feat:") {
                analysis.summary.push(line.trim().to_string());
            }
        }
        Ok(analysis)
    }
}

/// Lines of the "Best practices" section of systemPatterns.md
pub struct GenerateBestPractices;

#[derive(Debug, Serialize)]
pub struct BestPracticesOutput {
    pub best_practices: Vec<String>,
}

impl TypedAction for GenerateBestPractices {
    const NAME: &'static str = "generate_best_practices_action";
    type Input = NoInput;
    type Output = BestPracticesOutput;

    fn run(&self, ctx: &ActionContext<'_>, _input: NoInput) -> Result<BestPracticesOutput> {
        let patterns = match ctx.bank.read_text(SYSTEM_PATTERNS_FILE) {
            Ok(text) => text,
            Err(e) if matches!(crate::error::find_cacd_error(&e), Some(CacdError::NotFound(_))) => {
                String::new()
            }
            Err(e) => return Err(e),
        };

        let mut best_practices = Vec::new();
        let mut in_section = false;
        for line in patterns.lines() {
            if line.contains("Best practices") {
                in_section = true;
            } else if in_section && (line.trim().is_empty() || line.starts_with('#')) {
                in_section = false;
            } else if in_section {
                best_practices.push(line.trim().to_string());
            }
        }
        Ok(BestPracticesOutput { best_practices })
    }
}

/// Flags improvements and risks among the latest changelog lines
pub struct ReviewChanges;

#[derive(Debug, Serialize)]
pub struct ReviewOutput {
    pub improvements: Vec<String>,
    pub risks: Vec<String>,
}

impl TypedAction for ReviewChanges {
    const NAME: &'static str = "ai_review_changes_action";
    type Input = NoInput;
    type Output = ReviewOutput;

    fn run(&self, ctx: &ActionContext<'_>, _input: NoInput) -> Result<ReviewOutput> {
        let changelog = ctx.bank.read_text(CHANGELOG_FILE)?;
        let lines: Vec<&str> = changelog.lines().collect();
        let recent = &lines[lines.len().saturating_sub(REVIEW_WINDOW)..];

        let mut review = ReviewOutput {
            improvements: Vec::new(),
            risks: Vec::new(),
        };
        for line in recent {
            if line.contains("refactor") || line.contains("improve") {
                review.improvements.push(line.trim().to_string());
            }
            if line.contains("risk") || line.contains("breaking") {
                review.risks.push(line.trim().to_string());
            }
        }
        Ok(review)
    }
}
