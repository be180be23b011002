//! Text measurement (C5 half): per-grapheme-cluster display width under a
//! switchable emoji/ambiguous-width policy.

use unicode_width::UnicodeWidthChar;

use crate::config::WidthPolicy;

/// Returns true when `c` is a CJK ideograph, full-width form, or a
/// symbol/pictograph commonly rendered emoji-presentation (the set this
/// engine treats as width 2 under [`WidthPolicy::Wide`]).
fn is_wide_leader(c: char) -> bool {
    let cp = c as u32;
    matches!(cp,
        0x1100..=0x115F   // Hangul Jamo
        | 0x2E80..=0xA4CF // CJK radicals, Kangxi, CJK Unified, Hangul Syllables lead-in
        | 0xAC00..=0xD7A3 // Hangul syllables
        | 0xF900..=0xFAFF // CJK compatibility ideographs
        | 0xFF00..=0xFF60 // Fullwidth forms
        | 0xFFE0..=0xFFE6
        | 0x1F300..=0x1FAFF // Misc symbols & pictographs, emoticons, transport, supplemental
        | 0x20000..=0x3FFFD // CJK extension planes
    )
}

/// Variation Selector-16, forces emoji presentation on the preceding char.
const VS16: char = '\u{FE0F}';
/// Variation Selector-15, forces text presentation.
const VS15: char = '\u{FE0E}';
/// Zero-width joiner, combines adjacent emoji into one cluster.
const ZWJ: char = '\u{200D}';
/// Keycap combining enclosure (digit/`#`/`*` + this = width-2 keycap sequence).
const COMBINING_KEYCAP: char = '\u{20E3}';

/// Computes the display width, in cells, of a single extended grapheme
/// cluster (the caller is responsible for cluster segmentation; this
/// function assumes `cluster` is already one cluster, e.g. from the
/// `unicode-segmentation` crate or an equivalent grapheme walker).
///
/// Unpaired surrogates (represented upstream as `\u{FFFD}` after lossy
/// decoding, since `char` cannot hold an unpaired surrogate) yield width 1,
/// never a negative or panicking result.
pub fn cluster_width(cluster: &str, policy: WidthPolicy) -> u16 {
    let mut chars = cluster.chars().peekable();
    let Some(first) = chars.next() else {
        return 0;
    };

    // Keycap sequence: base + optional VS16 + combining keycap.
    if cluster.contains(COMBINING_KEYCAP) {
        return 2;
    }
    // Explicit presentation selectors override the base char's own width.
    if cluster.ends_with(VS16) {
        return 2;
    }
    if cluster.ends_with(VS15) {
        return 1;
    }
    // A ZWJ sequence joining multiple emoji-ish codepoints renders as one
    // wide glyph regardless of how many codepoints it joins.
    if cluster.contains(ZWJ) {
        return 2;
    }

    let base_width = match policy {
        WidthPolicy::Wide if is_wide_leader(first) => 2,
        _ => UnicodeWidthChar::width(first).unwrap_or(1) as u16,
    };
    base_width.max(if first == '\0' { 0 } else { 1 }).min(2)
}

/// Computes the total display width of `s`, in cells, walking it cluster by
/// cluster using `unicode-width`'s per-scalar measurement composed with the
/// cluster-level overrides above.
///
/// This engine does not depend on `unicode-segmentation`; it approximates
/// clusters by grouping a base scalar with any immediately following
/// combining marks, ZWJ continuations and variation selectors, which
/// covers the keycap/ZWJ/VS16 cases named in the width policy without
/// pulling in a second Unicode data table.
pub fn measure_str(s: &str, policy: WidthPolicy) -> u32 {
    let mut total: u32 = 0;
    let mut cluster = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        cluster.clear();
        cluster.push(c);
        while let Some(&next) = chars.peek() {
            if next == VS16 || next == VS15 || next == COMBINING_KEYCAP {
                cluster.push(next);
                chars.next();
                continue;
            }
            if next == ZWJ {
                cluster.push(next);
                chars.next();
                if let Some(&joined) = chars.peek() {
                    cluster.push(joined);
                    chars.next();
                }
                continue;
            }
            break;
        }
        total += cluster_width(&cluster, policy) as u32;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_width_one() {
        assert_eq!(measure_str("hello", WidthPolicy::Wide), 5);
    }

    #[test]
    fn test_cjk_ideograph_width_two() {
        assert_eq!(measure_str("中", WidthPolicy::Wide), 2);
    }

    #[test]
    fn test_emoji_with_vs16_width_two() {
        // Heart + VS16
        let s = "\u{2764}\u{FE0F}";
        assert_eq!(measure_str(s, WidthPolicy::Wide), 2);
    }

    #[test]
    fn test_keycap_sequence_width_two() {
        // '1' + VS16 + combining keycap
        let s = "1\u{FE0F}\u{20E3}";
        assert_eq!(measure_str(s, WidthPolicy::Wide), 2);
    }

    #[test]
    fn test_pictograph_without_vs16_default_width() {
        // Plain digit has width 1 regardless of policy.
        assert_eq!(measure_str("1", WidthPolicy::Wide), 1);
    }

    #[test]
    fn test_unpaired_surrogate_placeholder_nonnegative() {
        // Lossy decode of an unpaired surrogate yields U+FFFD.
        assert_eq!(measure_str("\u{FFFD}", WidthPolicy::Wide), 1);
    }

    #[test]
    fn test_narrow_policy_halves_cjk() {
        assert_eq!(measure_str("中", WidthPolicy::Narrow), 1);
    }

    #[test]
    fn test_empty_string_zero_width() {
        assert_eq!(measure_str("", WidthPolicy::Wide), 0);
    }
}
