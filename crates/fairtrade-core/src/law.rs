//! Collected statutes and the persisted corpus file.
//!
//! The corpus is a JSON array of [`LawRecord`]s written by the external law
//! collector. Records are validated once at the load boundary so downstream
//! stages never see a law without a title or an article without a number.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::CoreError;

/// A single statute as collected from the national law information service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawRecord {
    pub title: String,
    /// Short search keyword the collector used, e.g. "하도급법".
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub articles: Vec<ArticleRecord>,
}

/// One article of a statute. Order within [`LawRecord::articles`] is document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub number: String,
    #[serde(alias = "content")]
    pub text: String,
}

impl LawRecord {
    /// Total characters of article text, used to budget summary prompts.
    pub fn text_chars(&self) -> usize {
        self.articles.iter().map(|a| a.text.chars().count()).sum()
    }
}

/// An immutable, validated snapshot of the law corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    laws: Vec<LawRecord>,
}

impl Corpus {
    /// Validate and wrap a set of laws.
    ///
    /// Rejects blank titles, duplicate titles, and articles without a number.
    pub fn from_laws(laws: Vec<LawRecord>) -> Result<Self, CoreError> {
        let mut seen = HashSet::with_capacity(laws.len());
        for (i, law) in laws.iter().enumerate() {
            let title = law.title.trim();
            if title.is_empty() {
                return Err(CoreError::MalformedCorpus(format!(
                    "law at index {i} has a blank title"
                )));
            }
            if !seen.insert(title.to_string()) {
                return Err(CoreError::MalformedCorpus(format!(
                    "duplicate law title {title:?}"
                )));
            }
            if let Some(j) = law.articles.iter().position(|a| a.number.trim().is_empty()) {
                return Err(CoreError::MalformedCorpus(format!(
                    "article {j} of {title:?} has a blank number"
                )));
            }
        }
        Ok(Self { laws })
    }

    pub fn laws(&self) -> &[LawRecord] {
        &self.laws
    }

    pub fn len(&self) -> usize {
        self.laws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.laws.is_empty()
    }

    /// Total number of articles across all laws.
    pub fn article_count(&self) -> usize {
        self.laws.iter().map(|l| l.articles.len()).sum()
    }

    /// Find the laws a user-supplied name refers to, in corpus order.
    ///
    /// A case-insensitive exact match on title or keyword wins outright.
    /// Otherwise every law whose title starts with the name (case-insensitive)
    /// is returned. An empty result means the name matched nothing.
    pub fn select(&self, name: &str) -> Vec<&LawRecord> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let exact: Vec<&LawRecord> = self
            .laws
            .iter()
            .filter(|l| {
                l.title.trim().to_lowercase() == needle || l.keyword.trim().to_lowercase() == needle
            })
            .collect();
        if !exact.is_empty() {
            return exact;
        }

        self.laws
            .iter()
            .filter(|l| l.title.trim().to_lowercase().starts_with(&needle))
            .collect()
    }
}

/// Load and validate the corpus file.
///
/// A missing file is reported as [`CoreError::CorpusNotFound`]; records that do
/// not match the expected shape are reported as [`CoreError::MalformedCorpus`].
pub fn load_corpus(path: &Path) -> Result<Corpus, CoreError> {
    if !path.exists() {
        return Err(CoreError::CorpusNotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path)?;
    let laws: Vec<LawRecord> = serde_json::from_slice(&bytes).map_err(|e| {
        if e.is_io() {
            CoreError::Json(e)
        } else {
            CoreError::MalformedCorpus(e.to_string())
        }
    })?;

    let corpus = Corpus::from_laws(laws)?;
    info!(
        path = %path.display(),
        laws = corpus.len(),
        articles = corpus.article_count(),
        "loaded law corpus"
    );
    Ok(corpus)
}

/// Write laws to the corpus file, replacing any previous snapshot in one rename.
pub fn save_corpus(path: &Path, laws: &[LawRecord]) -> Result<(), CoreError> {
    let json = serde_json::to_vec_pretty(laws)?;
    let tmp = path.with_extension("json.tmp");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    info!(path = %path.display(), laws = laws.len(), "saved law corpus");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn law(title: &str, keyword: &str, articles: &[(&str, &str)]) -> LawRecord {
        LawRecord {
            title: title.into(),
            keyword: keyword.into(),
            url: format!("https://www.law.go.kr/법령/{title}"),
            articles: articles
                .iter()
                .map(|(n, t)| ArticleRecord {
                    number: (*n).into(),
                    text: (*t).into(),
                })
                .collect(),
        }
    }

    fn sample() -> Vec<LawRecord> {
        vec![
            law(
                "독점규제 및 공정거래에 관한 법률",
                "공정거래법",
                &[("1", "이 법은 사업자의 시장지배적지위의 남용을 방지한다.")],
            ),
            law(
                "하도급거래 공정화에 관한 법률",
                "하도급법",
                &[("1", "공정한 하도급거래질서를 확립한다."), ("4", "부당한 하도급대금의 결정 금지")],
            ),
            law("하도급거래 공정화에 관한 법률 시행령", "", &[("1", "시행령 목적")]),
        ]
    }

    #[test]
    fn save_then_load_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fair_trade_laws.json");
        save_corpus(&path, &sample()).unwrap();

        let corpus = load_corpus(&path).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.article_count(), 4);
        assert_eq!(corpus.laws()[1].articles[1].number, "4");
    }

    #[test]
    fn missing_file_is_corpus_not_found() {
        let result = load_corpus(Path::new("/nonexistent/fair_trade_laws.json"));
        assert!(matches!(result, Err(CoreError::CorpusNotFound(_))));
    }

    #[test]
    fn missing_title_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("laws.json");
        std::fs::write(&path, r#"[{"keyword": "하도급법", "articles": []}]"#).unwrap();
        assert!(matches!(
            load_corpus(&path),
            Err(CoreError::MalformedCorpus(_))
        ));
    }

    #[test]
    fn content_alias_accepted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("laws.json");
        std::fs::write(
            &path,
            r#"[{"title": "하도급법", "articles": [{"number": "1", "content": "목적"}]}]"#,
        )
        .unwrap();
        let corpus = load_corpus(&path).unwrap();
        assert_eq!(corpus.laws()[0].articles[0].text, "목적");
        assert_eq!(corpus.laws()[0].keyword, "");
    }

    #[test]
    fn duplicate_titles_rejected() {
        let laws = vec![law("하도급법", "", &[]), law(" 하도급법 ", "", &[])];
        assert!(matches!(
            Corpus::from_laws(laws),
            Err(CoreError::MalformedCorpus(_))
        ));
    }

    #[test]
    fn blank_article_number_rejected() {
        let laws = vec![law("하도급법", "", &[("  ", "본문")])];
        assert!(matches!(
            Corpus::from_laws(laws),
            Err(CoreError::MalformedCorpus(_))
        ));
    }

    #[test]
    fn select_prefers_exact_keyword() {
        let corpus = Corpus::from_laws(sample()).unwrap();
        let hits = corpus.select("하도급법");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "하도급거래 공정화에 관한 법률");
    }

    #[test]
    fn select_falls_back_to_prefix() {
        let corpus = Corpus::from_laws(sample()).unwrap();
        let hits = corpus.select("하도급거래");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].title, "하도급거래 공정화에 관한 법률 시행령");
    }

    #[test]
    fn select_unknown_is_empty() {
        let corpus = Corpus::from_laws(sample()).unwrap();
        assert!(corpus.select("존재하지않는법").is_empty());
        assert!(corpus.select("   ").is_empty());
    }
}
