//! Sort key normalisation for Korean statute article numbers.
//!
//! Converts article numbers as the collector records them ("1", "제1조",
//! "제2조의2", "2-2") into lexicographically-sortable strings so that
//! sorting by key recovers document order.
//!
//! # Korean legal numbering conventions
//!
//! - Plain article: 제1조, 제2조, ..., 제10조
//! - Branch article (inserted by amendment): 제2조의2 between 제2조 and 제3조
//! - Nested branch: 제2조의2의3 is rare but legal
//! - Supplementary provisions (부칙) and other unnumbered labels sort last

/// Normalise an article number into a lexicographically-sortable string.
///
/// Input: "3", "제3조", "제3조의2", "3의2", "3-2"
/// Output: "0003.000.000", "0003.000.000", "0003.002.000", "0003.002.000", "0003.002.000"
///
/// # Algorithm
///
/// 1. Strip an optional leading "제" and extract leading ASCII digits → base number
/// 2. Skip an optional "조"
/// 3. Parse up to 2 branch groups introduced by "의", "-" or "_"
/// 4. Pad to exactly 3 segments with "000" and join with "."
///
/// Numbers without leading digits keep their trimmed text behind a `~` prefix,
/// which sorts after every numeric key.
pub fn article_sort_key(s: &str) -> String {
    let s = s.trim();
    if s.is_empty() {
        return "0000.000.000".to_string();
    }

    let rest = s.strip_prefix('제').unwrap_or(s).trim_start();
    let Some((base, mut rest)) = take_number(rest) else {
        return format!("~{s}");
    };
    rest = rest.strip_prefix('조').unwrap_or(rest);

    let mut segments: Vec<u32> = vec![base];
    while segments.len() < 3 {
        let Some(after_sep) = rest
            .strip_prefix('의')
            .or_else(|| rest.strip_prefix('-'))
            .or_else(|| rest.strip_prefix('_'))
        else {
            break;
        };
        match take_number(after_sep) {
            Some((branch, tail)) => {
                segments.push(branch);
                rest = tail;
            }
            // Stop on unexpected character.
            None => break,
        }
    }

    while segments.len() < 3 {
        segments.push(0);
    }

    format!("{:04}.{:03}.{:03}", segments[0], segments[1], segments[2])
}

/// Split leading ASCII digits off `s`.
fn take_number(s: &str) -> Option<(u32, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().unwrap_or(u32::MAX);
    Some((value, &s[end..]))
}
