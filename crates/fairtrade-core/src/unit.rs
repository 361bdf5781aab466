//! Retrievable slices of statute text and the results of searching them.

use serde::{Deserialize, Serialize};

/// A retrievable slice of one article with a stable identity.
///
/// `unit_id` is `"{law_title}-{article_number}"` for an article that fits in
/// one unit and `"{law_title}-{article_number}#{part}"` for each window of a
/// split article (`part` starts at 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievableUnit {
    pub unit_id: String,
    pub text: String,
    pub law_title: String,
    pub article_number: String,
    /// Window index within a split article; 0 when the article was not split.
    pub part: u32,
}

impl RetrievableUnit {
    pub fn unit_id_for(law_title: &str, article_number: &str, part: u32) -> String {
        if part == 0 {
            format!("{law_title}-{article_number}")
        } else {
            format!("{law_title}-{article_number}#{part}")
        }
    }

    /// Human-readable citation, e.g. "하도급법 제4조".
    pub fn citation(&self) -> String {
        let number = self.article_number.trim();
        if number.starts_with('제') || !number.starts_with(|c: char| c.is_ascii_digit()) {
            format!("{} {}", self.law_title, number)
        } else {
            format!("{} 제{}조", self.law_title, number)
        }
    }

    /// Text handed to the embedding model: the citation header plus the body.
    pub fn embedding_text(&self) -> String {
        format!("[{}] {}", self.citation(), self.text)
    }
}

/// A unit returned by similarity search. Higher `score` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub unit: RetrievableUnit,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(number: &str) -> RetrievableUnit {
        RetrievableUnit {
            unit_id: RetrievableUnit::unit_id_for("하도급법", number, 0),
            text: "본문".into(),
            law_title: "하도급법".into(),
            article_number: number.into(),
            part: 0,
        }
    }

    #[test]
    fn unit_ids() {
        assert_eq!(RetrievableUnit::unit_id_for("하도급법", "1", 0), "하도급법-1");
        assert_eq!(RetrievableUnit::unit_id_for("하도급법", "1", 2), "하도급법-1#2");
    }

    #[test]
    fn citation_formats_bare_numbers() {
        assert_eq!(unit("4").citation(), "하도급법 제4조");
        assert_eq!(unit("제4조의2").citation(), "하도급법 제4조의2");
        assert_eq!(unit("부칙").citation(), "하도급법 부칙");
    }

    #[test]
    fn embedding_text_carries_citation() {
        assert_eq!(unit("4").embedding_text(), "[하도급법 제4조] 본문");
    }
}
