use super::*;

#[test]
fn normalize_strips_case_and_punctuation() {
    assert_eq!(normalize_title("Portal 2"), "portal 2");
    assert_eq!(normalize_title("  PORTAL   2 "), "portal 2");
    assert_eq!(normalize_title("Half-Life: Alyx"), "half life alyx");
    assert_eq!(normalize_title("Assassin's Creed® II"), "assassins creed ii");
    assert_eq!(normalize_title("DOOM™ Eternal"), "doom eternal");
}

#[test]
fn normalize_handles_empty_and_symbol_only() {
    assert_eq!(normalize_title(""), "");
    assert_eq!(normalize_title("™ - !"), "");
}

#[test]
fn similarity_identical_sets_is_one() {
    assert!((title_similarity("portal 2", "portal 2") - 1.0).abs() < 1e-9);
    // Token order does not matter.
    assert!((title_similarity("hunt wild", "wild hunt") - 1.0).abs() < 1e-9);
}

#[test]
fn similarity_partial_overlap() {
    // 2*4 / (5+4) = 0.888...
    let s = title_similarity("the witcher 3 wild hunt", "witcher 3 wild hunt");
    assert!(s > 0.88 && s < 0.89, "got {s}");

    // Sequels share most tokens but stay below the match threshold.
    let s = title_similarity("portal", "portal 2");
    assert!(s < 0.85, "got {s}");
}

#[test]
fn similarity_empty_is_zero() {
    assert_eq!(title_similarity("", "portal"), 0.0);
    assert_eq!(title_similarity("portal", ""), 0.0);
}

#[test]
fn slugify_joins_tokens() {
    assert_eq!(slugify("portal 2"), "portal-2");
    assert_eq!(slugify(""), "untitled");
}
