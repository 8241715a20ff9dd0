/*!
 * Tests for chunk planning
 */

use std::collections::BTreeMap;

use pagewise::document::{ContentBlock, NormalizedDocument};
use pagewise::providers::mock::MockProvider;
use pagewise::translation::{
    CancellationFlag, ChunkPlan, TranslationMode, estimate_size, plan_chunks, translate,
};

use crate::common;

fn mixed_document() -> NormalizedDocument {
    let mut embed = BTreeMap::new();
    embed.insert("kind".to_string(), "iframe".to_string());
    embed.insert("url".to_string(), "https://video.example.com/v/1".to_string());

    NormalizedDocument::from_blocks(
        "Mixed",
        "https://example.com/mixed",
        vec![
            ContentBlock::heading(2, "A heading that introduces the section"),
            ContentBlock::paragraph(common::english_paragraph(1, 260)),
            ContentBlock::quote("First quoted line that is fairly long.\nSecond quoted line, also long enough."),
            ContentBlock::image("https://example.com/a.png", "diagram"),
            ContentBlock::Table {
                rows: vec![
                    vec!["Name".to_string(), "Value".to_string()],
                    vec!["alpha".to_string(), "1".to_string()],
                    vec!["beta".to_string(), "2".to_string()],
                ],
            },
            ContentBlock::Embed { metadata: embed },
            ContentBlock::paragraph("Short closing words."),
        ],
    )
}

/// A unit may only exceed the budget when it holds a single unsplittable word
fn assert_within_budget(plan: &ChunkPlan) {
    for unit in &plan.units {
        let single_word = {
            let mut segments = unit.translatable_segments();
            match (segments.next(), segments.next()) {
                (Some(only), None) => !only.payload().contains(char::is_whitespace),
                _ => false,
            }
        };
        assert!(
            unit.size_estimate() <= plan.budget || single_word,
            "unit {} has size {} over budget {}",
            unit.index,
            unit.size_estimate(),
            plan.budget
        );
    }
}

#[test]
fn test_planChunks_withMixedBlocks_shouldReassembleEveryBlockExactly() {
    let doc = mixed_document();
    for budget in [1, 7, 40, 80, 1000] {
        let plan = plan_chunks(&doc, budget);
        let expected: Vec<String> = doc.blocks().iter().map(|b| b.to_markdown()).collect();
        assert_eq!(plan.reassemble_original(), expected, "budget {}", budget);
    }
}

#[test]
fn test_planChunks_withVariousBudgets_shouldRespectBudget() {
    let doc = mixed_document();
    for budget in [5, 30, 64, 100, 500] {
        assert_within_budget(&plan_chunks(&doc, budget));
    }
}

#[test]
fn test_planChunks_shouldKeepReadingOrder() {
    let plan = plan_chunks(&mixed_document(), 50);

    for (i, unit) in plan.units.iter().enumerate() {
        assert_eq!(unit.index, i);
    }
    let indices: Vec<usize> = plan.segments().map(|s| s.block_index).collect();
    assert!(indices.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(indices.last(), Some(&6));
}

#[test]
fn test_planChunks_withSmallBlocks_shouldPackThemTogether() {
    let doc = NormalizedDocument::from_blocks(
        "Packed",
        "https://example.com",
        vec![
            ContentBlock::paragraph("one two"),
            ContentBlock::paragraph("three four"),
            ContentBlock::paragraph("five six"),
        ],
    );
    let plan = plan_chunks(&doc, 100);
    assert_eq!(plan.units.len(), 1);
    assert_eq!(plan.units[0].segments.len(), 3);
    assert_eq!(plan.units[0].original_text, "one two\n\nthree four\n\nfive six");
    assert_eq!(plan.units[0].size_estimate(), 7 + 10 + 8 + 2 * 2);
}

#[test]
fn test_planChunks_withOversizedParagraph_shouldSplitAtSentences() {
    let text = "First sentence is here. Second sentence follows it. Third one closes.";
    let doc = NormalizedDocument::from_blocks("S", "https://example.com", vec![ContentBlock::paragraph(text)]);
    let plan = plan_chunks(&doc, 30);

    let pieces: Vec<&str> = plan.segments().map(|s| s.text.as_str()).collect();
    assert_eq!(
        pieces,
        vec!["First sentence is here. ", "Second sentence follows it. ", "Third one closes."]
    );
    assert_eq!(plan.units.len(), 3);
}

#[test]
fn test_planChunks_withCjkText_shouldSplitAfterFullStops() {
    let text = "第一句话比较长一些。第二句话也不短。第三句。";
    let doc = NormalizedDocument::from_blocks("中文", "https://example.com", vec![ContentBlock::paragraph(text)]);
    let plan = plan_chunks(&doc, 10);

    assert!(plan.units.len() >= 3);
    assert_eq!(plan.reassemble_original(), vec![text.to_string()]);
    assert_within_budget(&plan);
}

#[test]
fn test_planChunks_withOnlyImages_shouldNeedNoTranslation() {
    let doc = NormalizedDocument::from_blocks(
        "Gallery",
        "https://example.com",
        vec![ContentBlock::image("https://example.com/1.png", ""), ContentBlock::image("https://example.com/2.png", "")],
    );
    let plan = plan_chunks(&doc, 100);
    assert_eq!(plan.translatable_units(), 0);
    assert!(plan.units.iter().all(|u| !u.needs_translation()));
    assert_eq!(plan.reassemble_original().len(), 2);
}

#[test]
fn test_planChunks_withZeroBudget_shouldTreatItAsOne() {
    let doc = NormalizedDocument::from_blocks("Z", "https://example.com", vec![ContentBlock::paragraph("a b c")]);
    let plan = plan_chunks(&doc, 0);
    assert_eq!(plan.budget, 1);
    assert_eq!(plan.units.len(), 3);
    assert_eq!(plan.reassemble_original(), vec!["a b c".to_string()]);
}

#[test]
fn test_estimateSize_shouldCountCharactersNotBytes() {
    assert_eq!(estimate_size("  héllo  "), 5);
    assert_eq!(estimate_size("你好"), 2);
}

#[tokio::test]
async fn test_planChunks_withLeadingWhitespace_shouldGiveEverySegmentAPayload() {
    let text = "\n\nFirst sentence here. Second sentence here. Third sentence here.";
    let doc = NormalizedDocument::from_blocks("W", "https://example.com", vec![ContentBlock::paragraph(text)]);
    let mut plan = plan_chunks(&doc, 30);

    assert!(plan.segments().all(|s| !s.payload().is_empty()));
    assert_eq!(plan.units[0].translatable_segments().next().map(|s| s.payload()), Some("First sentence here."));
    assert_eq!(plan.reassemble_original(), vec![text.to_string()]);
    assert_within_budget(&plan);

    let result = translate(
        &mut plan,
        TranslationMode::Translated,
        &MockProvider::working(),
        &common::fast_engine("zh"),
        &CancellationFlag::new(),
    )
    .await
    .unwrap();
    assert_eq!(result.chunks_failed, 0);
}

#[test]
fn test_planChunks_withWhitespacePaddedBlocks_shouldRespectBudget() {
    let words = ["alpha beta?", "gamma delta.", "theta zeta?", "iota kappa!"];
    let blocks: Vec<ContentBlock> = (0..12)
        .map(|i| {
            let padding = if i % 2 == 0 { "\n\n" } else { "  " };
            ContentBlock::paragraph(format!("{}{} {}", padding, words[i % 4], words[(i + 1) % 4]))
        })
        .collect();
    let doc = NormalizedDocument::from_blocks("Padded", "https://example.com", blocks);

    for budget in [5, 11, 13, 24, 60] {
        let plan = plan_chunks(&doc, budget);
        assert!(plan.segments().filter(|s| s.translatable).all(|s| !s.payload().is_empty()));
        assert_within_budget(&plan);
        let expected: Vec<String> = doc.blocks().iter().map(|b| b.to_markdown()).collect();
        assert_eq!(plan.reassemble_original(), expected, "budget {}", budget);
    }
}

#[test]
fn test_planChunks_withCjkClausesOnly_shouldSplitAtCommas() {
    let clause = "我们沿着河边慢慢地走着，";
    let text = clause.repeat(27);
    assert!(estimate_size(&text) >= 320);
    let doc = NormalizedDocument::from_blocks("散步", "https://example.com", vec![ContentBlock::paragraph(text.clone())]);
    let plan = plan_chunks(&doc, 50);

    assert!(plan.units.len() >= 7);
    assert!(plan.units.iter().all(|u| u.size_estimate() <= 50));
    assert_eq!(plan.reassemble_original(), vec![text]);
}

#[test]
fn test_planChunks_withUnpunctuatedCjkRun_shouldSplitBetweenCharacters() {
    let text = "天气很好适合出门走走".repeat(20);
    let doc = NormalizedDocument::from_blocks("天气", "https://example.com", vec![ContentBlock::paragraph(text.clone())]);
    let plan = plan_chunks(&doc, 30);

    assert!(plan.units.iter().all(|u| u.size_estimate() <= 30));
    assert_eq!(plan.reassemble_original(), vec![text]);
}

#[test]
fn test_planChunks_withLongLatinWord_shouldNotSplitInsideIt() {
    let word = "x".repeat(60);
    let doc = NormalizedDocument::from_blocks(
        "Url",
        "https://example.com",
        vec![ContentBlock::paragraph(format!("see {}", word))],
    );
    let plan = plan_chunks(&doc, 20);

    assert!(plan.segments().any(|s| s.payload() == word));
    assert_within_budget(&plan);
}
