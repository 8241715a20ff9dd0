/*!
 * Markdown output.
 *
 * Renders a pipeline result as Markdown with a YAML front matter block and
 * writes it through a temporary file in the target directory, so an
 * interrupted run never leaves a half-written file behind.
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::pipeline::PipelineOutput;
use crate::translation::TranslationMode;

static FORBIDDEN_FILENAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const MAX_FILENAME_CHARS: usize = 120;

/// File name stem for a title: forbidden characters removed, whitespace collapsed
pub fn sanitize_filename(title: &str) -> String {
    let cleaned = FORBIDDEN_FILENAME_CHARS.replace_all(title, "");
    let collapsed = WHITESPACE_RUN.replace_all(cleaned.trim(), " ");
    let stem: String = collapsed
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect::<String>()
        .trim_end_matches(['.', ' '])
        .to_string();
    if stem.is_empty() { "untitled".to_string() } else { stem }
}

/// `.md` file name: the translated title when translation is active
pub fn output_file_name(output: &PipelineOutput) -> String {
    let title = if output.mode().requires_translation() {
        output.result.display_title()
    } else {
        output.result.title.as_str()
    };
    format!("{}.md", sanitize_filename(title))
}

/// YAML front matter of an output file
#[derive(Debug, Serialize)]
struct FrontMatter<'a> {
    title: &'a str,
    created: String,
    tags: &'a [String],
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    published: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    site: Option<&'a str>,
    /// Only recorded when the body was translated
    #[serde(skip_serializing_if = "Option::is_none")]
    translator: Option<&'a str>,
}

/// Markdown text of a run, front matter included
pub fn render_markdown(output: &PipelineOutput, translator: Option<&str>, created: DateTime<Local>) -> Result<String> {
    let result = &output.result;
    let metadata = &output.document.metadata;

    let front_matter = FrontMatter {
        title: result.display_title(),
        created: created.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        tags: &metadata.tags,
        source: &output.document.source_url,
        author: metadata.author.as_deref(),
        published: metadata.published.as_deref(),
        site: metadata.site.as_deref(),
        translator: translator.filter(|_| result.mode.requires_translation()),
    };
    let yaml = serde_yaml::to_string(&front_matter).context("Failed to serialize front matter")?;

    let mut sections = vec![format!("---\n{}---", yaml)];
    if !result.display_title().trim().is_empty() {
        sections.push(format!("# {}", result.display_title()));
    }
    if result.mode == TranslationMode::Both && result.translated_title.is_some() && result.display_title() != result.title {
        sections.push(format!("*{}*", result.title));
    }
    let body = result.body_markdown();
    if !body.is_empty() {
        sections.push(body);
    }

    let mut markdown = sections.join("\n\n");
    markdown.push('\n');
    Ok(markdown)
}

/// Write `content` to `dir/file_name` through a temporary file and rename
pub fn write_atomic(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    let target = dir.join(file_name);
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
    temp.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write temporary file for {:?}", target))?;
    temp.flush()?;
    temp.persist(&target)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move output into place: {:?}", target))?;

    Ok(target)
}

/// Writes run results as Markdown files into one directory
#[derive(Debug, Clone)]
pub struct MarkdownWriter {
    output_dir: PathBuf,
    translator: Option<String>,
}

impl MarkdownWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            translator: None,
        }
    }

    /// Label recorded as `translator` when the body was translated
    pub fn with_translator(mut self, translator: impl Into<String>) -> Self {
        self.translator = Some(translator.into());
        self
    }

    /// Render and write a run, returning the written path
    pub fn write(&self, output: &PipelineOutput) -> Result<PathBuf> {
        let content = render_markdown(output, self.translator.as_deref(), Local::now())?;
        let path = write_atomic(&self.output_dir, &output_file_name(output), &content)?;
        info!("Saved {}", path.display());
        Ok(path)
    }
}
