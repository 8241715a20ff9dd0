/*!
 * Tests for language utility functions
 */

use pagewise::document::{ContentBlock, NormalizedDocument};
use pagewise::language_utils::{
    LanguageCodeType, UNKNOWN_LANGUAGE, detect_language, detect_text_language, get_language_name,
    is_target_language, language_codes_match, normalize_to_part2t, validate_language_code,
};

#[test]
fn test_validate_language_code_withValidCodes_shouldReturnCorrectType() {
    assert!(matches!(validate_language_code("en").unwrap(), LanguageCodeType::Part1));
    assert!(matches!(validate_language_code("zho").unwrap(), LanguageCodeType::Part2T));
    assert!(matches!(validate_language_code("chi").unwrap(), LanguageCodeType::Part2B));
    assert!(matches!(validate_language_code("zh-CN").unwrap(), LanguageCodeType::Part1));
    assert!(validate_language_code("xyz").is_err());
    assert!(validate_language_code("e").is_err());
    assert!(validate_language_code("zh-Hans-CN").is_ok());
}

#[test]
fn test_validate_language_code_withTrailingGarbage_shouldRejectWholeTag() {
    // "not" is itself an ISO 639-3 code; the rest of the tag is not a region or script
    assert!(validate_language_code("not-a-language").is_err());
    assert!(validate_language_code("fr-abcdefghij").is_err());
    assert!(get_language_name("not-a-language").is_err());
}

#[test]
fn test_normalize_to_part2t_withVariants_shouldAgree() {
    assert_eq!(normalize_to_part2t("zh").unwrap(), "zho");
    assert_eq!(normalize_to_part2t("chi").unwrap(), "zho");
    assert_eq!(normalize_to_part2t("pt_BR").unwrap(), "por");
    assert_eq!(normalize_to_part2t(" FR ").unwrap(), "fra");
}

#[test]
fn test_language_codes_match_withEquivalentCodes_shouldMatch() {
    assert!(language_codes_match("zh", "zho"));
    assert!(language_codes_match("ger", "de"));
    assert!(!language_codes_match("en", "fr"));
    assert!(!language_codes_match("en", "not-a-code"));
}

#[test]
fn test_get_language_name_shouldReturnEnglishName() {
    assert_eq!(get_language_name("fr").unwrap(), "French");
    assert_eq!(get_language_name("zh-TW").unwrap(), "Chinese");
    assert!(get_language_name("qq").is_err());
}

#[test]
fn test_detectTextLanguage_withScripts_shouldClassify() {
    assert_eq!(detect_text_language("今天天气很好，我们去公园散步吧。"), "zh");
    assert_eq!(detect_text_language("今日はとてもいい天気ですね。散歩に行きましょう。"), "ja");
    assert_eq!(detect_text_language("오늘은 날씨가 아주 좋습니다."), "ko");
    assert_eq!(detect_text_language("Сегодня очень хорошая погода."), "ru");
    assert_eq!(detect_text_language("The weather is nice and the park is open."), "en");
    assert_eq!(detect_text_language("Le temps est beau et les enfants sont dans la rue."), "fr");
    assert_eq!(detect_text_language("12345 !!! ---"), UNKNOWN_LANGUAGE);
}

#[test]
fn test_detectLanguage_shouldNotModifyDocument() {
    let doc = NormalizedDocument::from_blocks(
        "周末",
        "https://example.com",
        vec![ContentBlock::paragraph("我们今天去爬山，风景非常漂亮。")],
    );
    let before = doc.clone();

    assert_eq!(detect_language(&doc), "zh");
    assert_eq!(doc, before);
    assert_eq!(doc.language, None);
}

#[test]
fn test_isTargetLanguage_shouldIgnoreRegionAndUnknown() {
    assert!(is_target_language("zh", "zh-CN"));
    assert!(is_target_language("en", "eng"));
    assert!(!is_target_language("en", "zh"));
    assert!(!is_target_language(UNKNOWN_LANGUAGE, "zh"));
}
