use anyhow::{Result, anyhow};
use isolang::Language;

use crate::document::NormalizedDocument;

/// Language utilities
///
/// ISO 639 code validation and matching, plus the side-effect-free
/// language classifier used to decide whether a page needs translation.
/// Language code type
pub enum LanguageCodeType {
    /// ISO 639-1 (2-letter) code
    Part1,
    /// ISO 639-2/T (3-letter) code
    Part2T,
    /// ISO 639-2/B (3-letter) code
    Part2B,
}

/// Tag returned by `detect_language` when no script dominates
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Number of characters sampled for detection
const DETECTION_SAMPLE_CHARS: usize = 1000;

// ISO 639-2/B codes that differ from their ISO 639-2/T counterpart
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

fn part2b_to_part2t(code: &str) -> Option<&'static str> {
    PART2B_TO_PART2T
        .iter()
        .find(|(b, _)| *b == code)
        .map(|(_, t)| *t)
}

fn is_well_formed_subtag(subtag: &str) -> bool {
    let alpha = subtag.chars().all(|c| c.is_ascii_alphabetic());
    let digits = subtag.chars().all(|c| c.is_ascii_digit());
    let alnum = subtag.chars().all(|c| c.is_ascii_alphanumeric());
    match subtag.len() {
        // region: "CN", "419"
        2 => alpha,
        3 => digits,
        // script ("Hans") or a variant starting with a digit ("1996")
        4 => alpha || (alnum && subtag.starts_with(|c: char| c.is_ascii_digit())),
        5..=8 => alnum,
        _ => false,
    }
}

/// Primary subtag of a well-formed tag: "zh-CN" -> "zh", "pt_BR" -> "pt".
///
/// Every later subtag must be a script, region or variant, so a tag such as
/// "not-a-language" is rejected even though "not" is a code.
fn primary_subtag(code: &str) -> Option<String> {
    let mut subtags = code.trim().split(['-', '_']);
    let primary = subtags.next()?.to_lowercase();
    let primary_ok = matches!(primary.len(), 2 | 3) && primary.chars().all(|c| c.is_ascii_alphabetic());
    (primary_ok && subtags.all(is_well_formed_subtag)).then_some(primary)
}

/// Validate if a language code is a valid ISO 639-1 or ISO 639-2 code
///
/// Script, region and variant subtags (`zh-Hans-CN`, `pt_BR`) are checked for
/// shape and otherwise ignored.
pub fn validate_language_code(code: &str) -> Result<LanguageCodeType> {
    let normalized_code = primary_subtag(code).ok_or_else(|| anyhow!("Malformed language tag: {}", code))?;

    match normalized_code.len() {
        2 if Language::from_639_1(&normalized_code).is_some() => Ok(LanguageCodeType::Part1),
        3 if Language::from_639_3(&normalized_code).is_some() => Ok(LanguageCodeType::Part2T),
        3 if part2b_to_part2t(&normalized_code).is_some() => Ok(LanguageCodeType::Part2B),
        _ => Err(anyhow!("Invalid language code: {}", code)),
    }
}

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized_code = primary_subtag(code).ok_or_else(|| anyhow!("Malformed language tag: {}", code))?;

    if normalized_code.len() == 2 {
        if let Some(lang) = Language::from_639_1(&normalized_code) {
            return Ok(lang.to_639_3().to_string());
        }
    } else if normalized_code.len() == 3 {
        if Language::from_639_3(&normalized_code).is_some() {
            return Ok(normalized_code);
        }
        if let Some(part2t) = part2b_to_part2t(&normalized_code) {
            return Ok(part2t.to_string());
        }
    }

    Err(anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Check if two language codes match (represent the same language)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}

// Per-script character counts over the sample
#[derive(Default)]
struct ScriptCounts {
    han: usize,
    kana: usize,
    hangul: usize,
    cyrillic: usize,
    arabic: usize,
    latin: usize,
}

impl ScriptCounts {
    fn tally(sample: &str) -> Self {
        let mut counts = Self::default();
        for c in sample.chars() {
            match c as u32 {
                0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF => counts.han += 1,
                0x3040..=0x30FF => counts.kana += 1,
                0xAC00..=0xD7AF | 0x1100..=0x11FF => counts.hangul += 1,
                0x0400..=0x04FF => counts.cyrillic += 1,
                0x0600..=0x06FF => counts.arabic += 1,
                _ if c.is_ascii_alphabetic() => counts.latin += 1,
                0x00C0..=0x024F => counts.latin += 1,
                _ => {}
            }
        }
        counts
    }
}

// Stop words that separate the common Latin-script languages
const LATIN_STOP_WORDS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "of", "to", "is", "that", "with", "for"]),
    ("fr", &["le", "la", "les", "et", "des", "est", "une", "dans"]),
    ("de", &["der", "die", "und", "das", "ist", "nicht", "mit", "ein"]),
    ("es", &["el", "los", "y", "que", "es", "una", "por", "del"]),
    ("it", &["il", "che", "di", "della", "una", "sono", "per", "gli"]),
    ("pt", &["os", "que", "não", "uma", "com", "para", "das", "dos"]),
];

fn classify_latin(sample: &str) -> &'static str {
    let words: Vec<String> = sample
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();

    LATIN_STOP_WORDS
        .iter()
        .map(|(lang, stop)| {
            let hits = words.iter().filter(|w| stop.contains(&w.as_str())).count();
            (*lang, hits)
        })
        .filter(|(_, hits)| *hits > 0)
        .max_by_key(|(_, hits)| *hits)
        .map(|(lang, _)| lang)
        .unwrap_or("en")
}

/// Classify text by its dominant script
pub fn detect_text_language(text: &str) -> String {
    let sample: String = text.chars().take(DETECTION_SAMPLE_CHARS).collect();
    let counts = ScriptCounts::tally(&sample);

    let letters = counts.han + counts.kana + counts.hangul + counts.cyrillic + counts.arabic + counts.latin;
    if letters == 0 {
        return UNKNOWN_LANGUAGE.to_string();
    }

    // Japanese text mixes kana with kanji; any meaningful kana share wins over Han
    let tag = if counts.kana * 10 >= letters {
        "ja"
    } else if counts.hangul * 4 >= letters {
        "ko"
    } else if counts.han * 4 >= letters {
        "zh"
    } else if counts.cyrillic * 2 >= letters {
        "ru"
    } else if counts.arabic * 2 >= letters {
        "ar"
    } else if counts.latin * 2 >= letters {
        classify_latin(&sample)
    } else {
        UNKNOWN_LANGUAGE
    };

    tag.to_string()
}

/// Detect the language of a document from its title and body.
///
/// Pure function: the document is not modified.
pub fn detect_language(doc: &NormalizedDocument) -> String {
    let mut text = doc.title.clone();
    text.push('\n');
    text.push_str(&doc.plain_text());
    detect_text_language(&text)
}

/// Whether a detected tag means no translation to `target` is needed.
///
/// Unknown detections never match, so the caller translates.
pub fn is_target_language(detected: &str, target: &str) -> bool {
    if detected == UNKNOWN_LANGUAGE {
        return false;
    }
    let same_primary = matches!(
        (primary_subtag(detected), primary_subtag(target)),
        (Some(a), Some(b)) if a == b
    );
    same_primary || language_codes_match(detected, target)
}
