//! Partition law records into retrievable units.
//!
//! Short articles become one unit each. Long articles are cut at paragraph,
//! then sentence, then character boundaries into overlapping windows, so no
//! text is dropped and the context around every cut appears in both windows.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::sort_key::article_sort_key;
use crate::{ChunkConfig, CoreError, LawRecord, RetrievableUnit};

/// Deterministic law → unit partitioner.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Turn laws into units ordered by law title, article number, then part.
    pub fn chunk(&self, laws: &[LawRecord]) -> Result<Vec<RetrievableUnit>, CoreError> {
        if laws.is_empty() {
            return Err(CoreError::EmptyCorpus);
        }

        let mut units = Vec::new();
        let mut split_articles = 0usize;

        for law in laws {
            let title = law.title.trim();
            // Repeated numbers (e.g. several 부칙 제1조) still need distinct ids.
            let mut occurrences: HashMap<&str, u32> = HashMap::new();

            for article in &law.articles {
                if article.text.trim().is_empty() {
                    warn!(law = title, article = %article.number, "skipping article with blank text");
                    continue;
                }

                let number = article.number.trim();
                let seen = occurrences.entry(number).or_insert(0);
                *seen += 1;
                let id_number = if *seen == 1 {
                    number.to_string()
                } else {
                    format!("{number}@{seen}")
                };

                if article.text.chars().count() <= self.config.max_chars {
                    units.push(RetrievableUnit {
                        unit_id: RetrievableUnit::unit_id_for(title, &id_number, 0),
                        text: article.text.clone(),
                        law_title: title.to_string(),
                        article_number: number.to_string(),
                        part: 0,
                    });
                    continue;
                }

                let windows = self.split(&article.text);
                debug!(law = title, article = number, windows = windows.len(), "split long article");
                split_articles += 1;
                for (i, text) in windows.into_iter().enumerate() {
                    let part = i as u32 + 1;
                    units.push(RetrievableUnit {
                        unit_id: RetrievableUnit::unit_id_for(title, &id_number, part),
                        text,
                        law_title: title.to_string(),
                        article_number: number.to_string(),
                        part,
                    });
                }
            }
        }

        // Stable: articles sharing a sort key keep corpus order.
        units.sort_by_cached_key(|u| {
            (
                u.law_title.clone(),
                article_sort_key(&u.article_number),
                u.part,
            )
        });

        info!(
            laws = laws.len(),
            units = units.len(),
            split_articles,
            "chunked law corpus"
        );
        Ok(units)
    }

    /// Split one long text into overlapping windows of at most `window_chars`.
    pub fn split(&self, text: &str) -> Vec<String> {
        let window = self.config.window_chars;
        let overlap = self.config.overlap_chars;
        // Room left for new text once the carried overlap is in place.
        let piece_limit = window - overlap;

        let segments = segment(text, piece_limit);
        let mut windows = Vec::new();
        let mut carry = String::new();
        let mut i = 0;

        while i < segments.len() {
            let first = i;
            let mut current = carry.clone();
            let mut len = carry.chars().count();

            while i < segments.len() {
                let seg_len = segments[i].chars().count();
                if i > first && len + seg_len > window {
                    break;
                }
                current.push_str(segments[i]);
                len += seg_len;
                i += 1;
            }
            windows.push(current);

            if i == segments.len() || overlap == 0 {
                carry.clear();
                continue;
            }

            // Carry whole trailing segments when they fit, else a character tail.
            let mut j = i;
            let mut carried = 0;
            while j > first {
                let seg_len = segments[j - 1].chars().count();
                if carried + seg_len > overlap {
                    break;
                }
                carried += seg_len;
                j -= 1;
            }
            carry = if j < i {
                segments[j..i].concat()
            } else {
                tail_chars(segments[i - 1], overlap)
            };
        }

        windows
    }
}

/// Cut text into boundary-preserving pieces no longer than `limit` characters.
///
/// Concatenating the pieces reproduces `text` exactly.
fn segment(text: &str, limit: usize) -> Vec<&str> {
    let mut out = Vec::new();
    for paragraph in text.split_inclusive('\n') {
        if paragraph.chars().count() <= limit {
            out.push(paragraph);
            continue;
        }
        for sentence in split_sentences(paragraph) {
            if sentence.chars().count() <= limit {
                out.push(sentence);
            } else {
                out.extend(hard_split(sentence, limit));
            }
        }
    }
    out
}

/// Split after sentence terminators followed by whitespace, keeping the whitespace
/// with the preceding sentence. A period after a digit ("1. ") is an item number,
/// not a sentence end.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut iter = text.char_indices().peekable();

    while let Some((idx, c)) = iter.next() {
        let is_terminator = matches!(c, '.' | '?' | '!' | '。')
            && !(c == '.' && prev.is_some_and(|p| p.is_ascii_digit()));
        prev = Some(c);
        if !is_terminator {
            continue;
        }

        let mut end = idx + c.len_utf8();
        let mut saw_space = false;
        while let Some(&(next_idx, next)) = iter.peek() {
            if !next.is_whitespace() {
                break;
            }
            saw_space = true;
            end = next_idx + next.len_utf8();
            prev = Some(next);
            iter.next();
        }
        if saw_space {
            out.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn hard_split(text: &str, limit: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == limit {
            out.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn tail_chars(text: &str, n: usize) -> String {
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(n)).collect()
}
