/*!
 * Tests for Markdown rendering and atomic output
 */

use anyhow::Result;
use chrono::{Local, TimeZone};
use serde_yaml::Value;
use std::fs;

use pagewise::document::{BlockKind, DocumentMetadata, NormalizedDocument};
use pagewise::output::{MarkdownWriter, output_file_name, render_markdown, sanitize_filename, write_atomic};
use pagewise::pipeline::{ModeSource, PipelineOutput};
use pagewise::translation::{RenderedSegment, SegmentRole, TranslationMode, TranslationResult};

use crate::common;

fn segment(block_index: usize, role: SegmentRole, text: &str) -> RenderedSegment {
    RenderedSegment {
        block_index,
        kind: BlockKind::Paragraph,
        role,
        text: text.to_string(),
        substituted: false,
    }
}

/// Parse the YAML block between the leading `---` fences
fn front_matter(markdown: &str) -> Value {
    let yaml = markdown
        .strip_prefix("---\n")
        .and_then(|rest| rest.split_once("\n---\n"))
        .map(|(yaml, _)| yaml)
        .unwrap();
    serde_yaml::from_str(yaml).unwrap()
}

fn sample_output(mode: TranslationMode) -> PipelineOutput {
    let metadata = DocumentMetadata {
        author: Some("Jane Doe".to_string()),
        published: Some("2024-05-01".to_string()),
        tags: vec!["rust".to_string(), "web".to_string()],
        site: None,
    };
    let document = NormalizedDocument::new("Hello: World?", "https://example.com/hello").with_metadata(metadata);

    let (translated_title, body) = match mode {
        TranslationMode::Original => (None, vec![segment(0, SegmentRole::Original, "First paragraph.")]),
        TranslationMode::Translated => (
            Some("你好 世界".to_string()),
            vec![segment(0, SegmentRole::Translated, "第一段。")],
        ),
        TranslationMode::Both => (
            Some("你好 世界".to_string()),
            vec![
                segment(0, SegmentRole::Original, "First paragraph."),
                segment(0, SegmentRole::Translated, "第一段。"),
            ],
        ),
    };

    PipelineOutput {
        document,
        adapter: "generic".to_string(),
        rendered_via_browser: false,
        mode_source: ModeSource::UserFlag,
        result: TranslationResult {
            mode,
            title: "Hello: World?".to_string(),
            translated_title,
            body,
            warnings: Vec::new(),
            chunks_total: 1,
            chunks_failed: 0,
        },
    }
}

#[test]
fn test_renderMarkdown_withTranslation_shouldWriteFrontMatterAndTitle() {
    let created = Local.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap();
    let markdown =
        render_markdown(&sample_output(TranslationMode::Translated), Some("ollama/llama3.2:3b"), created).unwrap();

    let fm = front_matter(&markdown);
    assert_eq!(fm["title"].as_str(), Some("你好 世界"));
    assert!(fm["created"].as_str().unwrap().starts_with("2024-05-02T08:30:00"));
    assert_eq!(fm["tags"][0].as_str(), Some("rust"));
    assert_eq!(fm["tags"][1].as_str(), Some("web"));
    assert_eq!(fm["source"].as_str(), Some("https://example.com/hello"));
    assert_eq!(fm["author"].as_str(), Some("Jane Doe"));
    assert_eq!(fm["published"].as_str(), Some("2024-05-01"));
    assert_eq!(fm["translator"].as_str(), Some("ollama/llama3.2:3b"));
    assert!(fm.get("site").is_none());
    assert!(markdown.ends_with("---\n\n# 你好 世界\n\n第一段。\n"));
}

#[test]
fn test_renderMarkdown_withOriginalMode_shouldOmitTranslator() {
    let created = Local.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap();
    let markdown =
        render_markdown(&sample_output(TranslationMode::Original), Some("ollama/llama3.2:3b"), created).unwrap();

    assert!(front_matter(&markdown).get("translator").is_none());
    assert!(markdown.contains("# Hello: World?\n\nFirst paragraph.\n"));
}

#[test]
fn test_renderMarkdown_withControlCharacters_shouldKeepFrontMatterParseable() {
    let created = Local.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap();
    let mut output = sample_output(TranslationMode::Original);
    output.result.title = "Bell\u{7} \"quoted\": value".to_string();
    output.document.metadata.author = Some("\t".to_string());
    output.document.metadata.tags = vec!["- dash".to_string(), "#hash".to_string()];

    let fm = front_matter(&render_markdown(&output, None, created).unwrap());

    assert_eq!(fm["title"].as_str(), Some("Bell\u{7} \"quoted\": value"));
    assert_eq!(fm["author"].as_str(), Some("\t"));
    assert_eq!(fm["tags"][0].as_str(), Some("- dash"));
    assert_eq!(fm["tags"][1].as_str(), Some("#hash"));
}

#[test]
fn test_renderMarkdown_withBothMode_shouldShowOriginalTitleAndPairs() {
    let created = Local.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap();
    let markdown = render_markdown(&sample_output(TranslationMode::Both), None, created).unwrap();

    assert!(markdown.contains("# 你好 世界\n\n*Hello: World?*\n\nFirst paragraph.\n\n第一段。\n"));
}

#[test]
fn test_outputFileName_shouldFollowModeAndSanitize() {
    assert_eq!(output_file_name(&sample_output(TranslationMode::Translated)), "你好 世界.md");
    assert_eq!(output_file_name(&sample_output(TranslationMode::Original)), "Hello World.md");
    assert_eq!(sanitize_filename("a/b\\c"), "abc");
}

#[test]
fn test_writeAtomic_shouldCreateDirectoryAndLeaveNoTempFiles() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let target_dir = temp_dir.path().join("nested").join("out");

    let path = write_atomic(&target_dir, "note.md", "content")?;
    assert_eq!(fs::read_to_string(&path)?, "content");

    write_atomic(&target_dir, "note.md", "replaced")?;
    assert_eq!(fs::read_to_string(&path)?, "replaced");

    let entries: Vec<_> = fs::read_dir(&target_dir)?.collect::<Result<_, _>>()?;
    assert_eq!(entries.len(), 1);
    Ok(())
}

#[test]
fn test_markdownWriter_write_shouldUseTitleAsFileName() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let writer = MarkdownWriter::new(temp_dir.path()).with_translator("mock/model");

    let path = writer.write(&sample_output(TranslationMode::Translated))?;

    assert_eq!(path, temp_dir.path().join("你好 世界.md"));
    let content = fs::read_to_string(path)?;
    assert_eq!(front_matter(&content)["translator"].as_str(), Some("mock/model"));
    Ok(())
}
