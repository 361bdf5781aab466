//! Grounded case analysis and per-law summaries on top of retrieval.

use std::sync::Arc;
use std::time::Duration;

use fairtrade_ai::{AiError, Generator, Prompt};
use fairtrade_core::{Corpus, LawRecord, RagConfig, RetrievableUnit, RetrievalResult};
use serde::Serialize;
use tracing::{info, warn};

use crate::prompts::{self, NO_ARTICLES_NOTE, NO_CONTEXT_NARRATIVE, SECTION_HEADINGS};
use crate::retriever::{Retriever, normalize_query};
use crate::EngineError;

/// Attempts per generation request: the first call plus one immediate retry.
const GENERATION_ATTEMPTS: u32 = 2;

/// The model's narrative plus the law units it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub narrative: String,
    pub cited_units: Vec<RetrievalResult>,
}

impl AnalysisResult {
    /// Split the narrative at the requested headings.
    ///
    /// Returns `(heading, body)` for each heading found, in narrative order.
    /// A narrative that ignored the requested layout yields an empty list.
    pub fn sections(&self) -> Vec<(&'static str, String)> {
        let mut found: Vec<(&'static str, Vec<&str>)> = Vec::new();
        for line in self.narrative.lines() {
            match heading_of(line) {
                Some(heading) => found.push((heading, Vec::new())),
                None => {
                    if let Some((_, body)) = found.last_mut() {
                        body.push(line);
                    }
                }
            }
        }
        found
            .into_iter()
            .map(|(heading, body)| (heading, body.join("\n").trim().to_string()))
            .collect()
    }

    /// Context units whose article the narrative names, e.g. "제4조".
    ///
    /// When context units from different laws share an article number, a
    /// mention only counts if the law's title precedes it on the same line.
    pub fn mentioned_units(&self) -> Vec<&RetrievableUnit> {
        let named: Vec<&RetrievableUnit> = self
            .cited_units
            .iter()
            .map(|r| &r.unit)
            .filter(|u| names_article(&self.narrative, &u.article_number))
            .collect();
        named
            .iter()
            .copied()
            .filter(|u| {
                let ambiguous = named.iter().any(|other| {
                    other.law_title != u.law_title
                        && article_needle(&other.article_number) == article_needle(&u.article_number)
                });
                !ambiguous || names_law_article(&self.narrative, &u.law_title, &u.article_number)
            })
            .collect()
    }
}

/// A heading line is a short line (optionally marked up with `#`, `*`, or a
/// list number) that starts with one of the requested section names.
fn heading_of(line: &str) -> Option<&'static str> {
    let stripped = line
        .trim()
        .trim_start_matches(|c: char| c == '#' || c == '*' || c.is_ascii_digit() || c == '.')
        .trim_start();
    SECTION_HEADINGS
        .into_iter()
        .find(|h| stripped.starts_with(h) && stripped.chars().count() <= h.chars().count() + 4)
}

fn article_needle(article_number: &str) -> String {
    let number = article_number.trim();
    if number.starts_with('제') {
        number.to_string()
    } else {
        format!("제{number}조")
    }
}

/// Byte offsets where the narrative names the article.
fn article_mentions<'a>(narrative: &'a str, needle: &'a str) -> impl Iterator<Item = usize> + 'a {
    narrative.match_indices(needle).filter_map(move |(at, _)| {
        // "제4조" must not match inside "제4조의2".
        let suffixed = narrative[at + needle.len()..].starts_with('의') && !needle.contains('의');
        (!suffixed).then_some(at)
    })
}

fn names_article(narrative: &str, article_number: &str) -> bool {
    let needle = article_needle(article_number);
    article_mentions(narrative, &needle).next().is_some()
}

fn names_law_article(narrative: &str, law_title: &str, article_number: &str) -> bool {
    let needle = article_needle(article_number);
    let title = compact(law_title);
    article_mentions(narrative, &needle).any(|at| {
        let line_start = narrative[..at].rfind('\n').map_or(0, |i| i + 1);
        compact(&narrative[line_start..at]).contains(&title)
    })
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

pub struct Composer {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    analysis_k: usize,
    summary_input_chars: usize,
    timeout: Duration,
}

impl Composer {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, config: &RagConfig) -> Self {
        Self {
            retriever,
            generator,
            analysis_k: config.retrieval.analysis_k,
            summary_input_chars: config.generation.summary_input_chars,
            timeout: Duration::from_secs(config.generation.timeout_secs),
        }
    }

    /// Override the per-call generation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Analyse a case against the retrieved law units.
    ///
    /// When nothing relevant is retrieved the generator is not called and a
    /// fixed narrative with no cited units is returned.
    pub async fn analyze_case(&self, case_description: &str) -> Result<AnalysisResult, EngineError> {
        let query = normalize_query(case_description)?;
        let context = self.retriever.retrieve(&query, self.analysis_k).await?;

        if context.is_empty() {
            info!("no relevant law units; skipping generation");
            return Ok(AnalysisResult {
                narrative: NO_CONTEXT_NARRATIVE.to_string(),
                cited_units: vec![],
            });
        }

        let prompt = prompts::analysis_prompt(case_description, &context);
        let narrative = self.generate(&prompt).await?;
        info!(
            cited = context.len(),
            chars = narrative.chars().count(),
            "case analysed"
        );
        Ok(AnalysisResult {
            narrative,
            cited_units: context,
        })
    }

    /// Summarise one law (matched by title or keyword) or, with `None`, every
    /// law in corpus order.
    pub async fn summarize_law(
        &self,
        corpus: &Corpus,
        law_title: Option<&str>,
    ) -> Result<String, EngineError> {
        let laws: Vec<&LawRecord> = match law_title {
            Some(name) if name.trim().is_empty() => {
                return Err(EngineError::InvalidInput("law title is empty".into()));
            }
            Some(name) => {
                let selected = corpus.select(name);
                if selected.is_empty() {
                    return Err(EngineError::LawNotFound(name.trim().to_string()));
                }
                selected
            }
            None => {
                if corpus.is_empty() {
                    return Err(EngineError::EmptyCorpus);
                }
                corpus.laws().iter().collect()
            }
        };

        let mut sections = Vec::with_capacity(laws.len());
        for law in laws {
            let body = self.summarize_one(law).await?;
            sections.push(format!("# {}\n\n{}", law.title, body.trim()));
        }
        Ok(sections.join("\n\n---\n\n"))
    }

    async fn summarize_one(&self, law: &LawRecord) -> Result<String, EngineError> {
        if law.articles.is_empty() {
            return Ok(NO_ARTICLES_NOTE.to_string());
        }

        let parts = pack_articles(law, self.summary_input_chars);
        let mut summaries = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let prompt = prompts::summary_prompt(law, part, i + 1, parts.len());
            summaries.push(self.generate(&prompt).await?.trim().to_string());
        }
        info!(law = %law.title, parts = parts.len(), "law summarised");
        Ok(summaries.join("\n\n"))
    }

    /// One call plus one immediate retry, each bounded by the timeout.
    async fn generate(&self, prompt: &Prompt) -> Result<String, EngineError> {
        let mut last_error = None;
        for attempt in 1..=GENERATION_ATTEMPTS {
            let outcome = tokio::time::timeout(self.timeout, self.generator.generate(prompt)).await;
            let error = match outcome {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => e,
                Err(_) => AiError::Timeout(self.timeout),
            };
            warn!(
                attempt,
                model = self.generator.model_name(),
                error = %error,
                "generation failed"
            );
            last_error = Some(error);
        }
        Err(EngineError::GenerationBackend(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

/// Render a law's articles and pack them into parts of at most `limit`
/// characters. An article longer than `limit` is split on its own.
fn pack_articles(law: &LawRecord, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    let pieces = law.articles.iter().flat_map(|a| {
        let number = a.number.trim();
        let heading = if number.starts_with('제') {
            number.to_string()
        } else {
            format!("제{number}조")
        };
        split_chars(&format!("{heading} {}", a.text.trim()), limit)
    });

    for piece in pieces {
        let chars = piece.chars().count();
        let sep = if current.is_empty() { 0 } else { 2 };
        if current_chars + sep + chars > limit && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_chars += 2;
        }
        current.push_str(&piece);
        current_chars += chars;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn split_chars(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(limit).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairtrade_ai::testing::{KeywordEmbedder, ScriptedGenerator};
    use fairtrade_core::{ArticleRecord, Chunker};
    use fairtrade_store::{IndexOptions, VectorIndex};

    fn law(title: &str, keyword: &str, articles: &[(&str, &str)]) -> LawRecord {
        LawRecord {
            title: title.into(),
            keyword: keyword.into(),
            url: String::new(),
            articles: articles
                .iter()
                .map(|(n, t)| ArticleRecord {
                    number: n.to_string(),
                    text: t.to_string(),
                })
                .collect(),
        }
    }

    fn corpus() -> Corpus {
        Corpus::from_laws(vec![
            law(
                "독점규제 및 공정거래에 관한 법률",
                "공정거래법",
                &[
                    ("5", "시장지배적사업자는 지위를 남용하여 다른 사업자의 사업활동을 부당하게 방해하여서는 아니 된다."),
                    ("45", "사업자는 거래상대방에게 불이익이 되도록 거래조건을 설정하거나 변경하여서는 아니 된다."),
                ],
            ),
            law(
                "하도급거래 공정화에 관한 법률",
                "하도급법",
                &[
                    ("4", "원사업자는 수급사업자에게 부당하게 낮은 수준으로 하도급대금을 결정하여서는 아니 된다."),
                    ("11", "원사업자는 정당한 사유 없이 하도급대금을 감액하여서는 아니 된다."),
                ],
            ),
            law("대규모유통업에서의 거래 공정화에 관한 법률", "대규모유통업법", &[]),
        ])
        .unwrap()
    }

    struct Fixture {
        embedder: Arc<KeywordEmbedder>,
        generator: Arc<ScriptedGenerator>,
        composer: Composer,
    }

    async fn fixture(generator: ScriptedGenerator, build: bool) -> Fixture {
        let config = RagConfig::default();
        let embedder = Arc::new(KeywordEmbedder::new(256));
        let generator = Arc::new(generator);
        let index = Arc::new(VectorIndex::new(embedder.clone(), IndexOptions::in_memory()));
        if build {
            let units = Chunker::new(config.chunking.clone())
                .unwrap()
                .chunk(corpus().laws())
                .unwrap();
            index.build(&units).await.unwrap();
        }
        let composer = Composer::new(Retriever::new(index), generator.clone(), &config)
            .with_timeout(Duration::from_millis(200));
        Fixture {
            embedder,
            generator,
            composer,
        }
    }

    const NARRATIVE: &str = "### 적용 법령\n하도급법 제11조(감액금지)가 적용됩니다.\n\n\
                             ### 위반 가능성 평가\n정당한 사유 없는 30% 감액은 위반 가능성이 높습니다.\n\n\
                             ### 권고 사항\n공정거래위원회 신고를 검토하십시오.";

    #[tokio::test]
    async fn blank_case_rejected_before_any_backend() {
        let f = fixture(ScriptedGenerator::new(NARRATIVE), true).await;
        let calls_before = f.embedder.calls();
        let result = f.composer.analyze_case("   \n ").await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
        assert_eq!(f.embedder.calls(), calls_before);
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn analysis_before_build_reports_unbuilt_index() {
        let f = fixture(ScriptedGenerator::new(NARRATIVE), false).await;
        assert!(matches!(
            f.composer.analyze_case("하도급 대금 삭감").await,
            Err(EngineError::IndexNotBuilt)
        ));
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn analysis_is_grounded_in_retrieved_units() {
        let f = fixture(ScriptedGenerator::new(NARRATIVE), true).await;
        let result = f
            .composer
            .analyze_case("원사업자가 하도급대금을 일방적으로 감액하겠다고 통보했습니다.")
            .await
            .unwrap();

        assert_eq!(result.narrative, NARRATIVE);
        assert_eq!(result.cited_units.len(), 4, "analysis_k exceeds corpus size");
        assert_eq!(result.cited_units[0].unit.law_title, "하도급거래 공정화에 관한 법률");

        let prompts = f.generator.prompts();
        assert_eq!(prompts.len(), 1);
        for hit in &result.cited_units {
            assert!(prompts[0].user.contains(&hit.unit.citation()));
        }
    }

    #[tokio::test]
    async fn sections_and_mentions_parsed_from_narrative() {
        let f = fixture(ScriptedGenerator::new(NARRATIVE), true).await;
        let result = f.composer.analyze_case("하도급 대금 감액").await.unwrap();

        let sections = result.sections();
        let headings: Vec<&str> = sections.iter().map(|(h, _)| *h).collect();
        assert_eq!(headings, SECTION_HEADINGS.to_vec());
        assert!(sections[1].1.contains("30% 감액"));

        let mentioned: Vec<&str> = result
            .mentioned_units()
            .iter()
            .map(|u| u.unit_id.as_str())
            .collect();
        assert_eq!(mentioned, vec!["하도급거래 공정화에 관한 법률-11"]);
    }

    #[tokio::test]
    async fn empty_index_skips_generation() {
        let config = RagConfig::default();
        let generator = Arc::new(ScriptedGenerator::new(NARRATIVE));
        let index = Arc::new(VectorIndex::new(
            Arc::new(KeywordEmbedder::new(64)),
            IndexOptions::in_memory(),
        ));
        index.build(&[]).await.unwrap();
        let composer = Composer::new(Retriever::new(index), generator.clone(), &config);

        let result = composer.analyze_case("하도급 대금 삭감").await.unwrap();
        assert_eq!(result.narrative, NO_CONTEXT_NARRATIVE);
        assert!(result.cited_units.is_empty());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn single_failure_is_retried() {
        let generator = ScriptedGenerator::new(NARRATIVE).fail_next(1, "503 Service Unavailable");
        let f = fixture(generator, true).await;
        let result = f.composer.analyze_case("하도급 대금 삭감").await.unwrap();
        assert_eq!(result.narrative, NARRATIVE);
        assert_eq!(f.generator.calls(), 2);
        let prompts = f.generator.prompts();
        assert_eq!(prompts[0], prompts[1], "retry resends the identical prompt");
    }

    #[tokio::test]
    async fn repeated_failure_surfaces_backend_message() {
        let generator = ScriptedGenerator::new(NARRATIVE).fail_next(2, "503 Service Unavailable");
        let f = fixture(generator, true).await;
        match f.composer.analyze_case("하도급 대금 삭감").await {
            Err(EngineError::GenerationBackend(msg)) => {
                assert!(msg.contains("503 Service Unavailable"))
            }
            other => panic!("expected GenerationBackend, got {other:?}"),
        }
        assert_eq!(f.generator.calls(), 2);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let generator = ScriptedGenerator::new(NARRATIVE).with_delay(Duration::from_secs(5));
        let f = fixture(generator, true).await;
        let composer = f.composer.with_timeout(Duration::from_millis(20));
        assert!(matches!(
            composer.analyze_case("하도급 대금 삭감").await,
            Err(EngineError::GenerationBackend(msg)) if msg.contains("timed out")
        ));
        assert_eq!(f.generator.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_law_not_found() {
        let f = fixture(ScriptedGenerator::new("요약"), false).await;
        assert!(matches!(
            f.composer.summarize_law(&corpus(), Some("존재하지않는법")).await,
            Err(EngineError::LawNotFound(name)) if name == "존재하지않는법"
        ));
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn summary_by_keyword() {
        let f = fixture(ScriptedGenerator::new("하도급 요약"), false).await;
        let summary = f
            .composer
            .summarize_law(&corpus(), Some("하도급법"))
            .await
            .unwrap();
        assert_eq!(summary, "# 하도급거래 공정화에 관한 법률\n\n하도급 요약");
        assert_eq!(f.generator.calls(), 1);
        assert!(f.generator.prompts()[0].user.contains("제11조 원사업자는"));
    }

    #[tokio::test]
    async fn full_summary_in_corpus_order() {
        let f = fixture(
            ScriptedGenerator::new("기본").then_reply("공정거래 요약").then_reply("하도급 요약"),
            false,
        )
        .await;
        let summary = f.composer.summarize_law(&corpus(), None).await.unwrap();
        let sections: Vec<&str> = summary.split("\n\n---\n\n").collect();
        assert_eq!(sections.len(), 3);
        assert!(sections[0].starts_with("# 독점규제 및 공정거래에 관한 법률\n\n공정거래 요약"));
        assert!(sections[1].starts_with("# 하도급거래 공정화에 관한 법률\n\n하도급 요약"));
        assert!(sections[2].ends_with(NO_ARTICLES_NOTE));
        assert_eq!(f.generator.calls(), 2, "a law without articles needs no call");
    }

    #[test]
    fn long_law_packed_into_bounded_parts() {
        let long = "가".repeat(90);
        let record = law(
            "테스트법",
            "",
            &[("1", &long), ("2", &long), ("3", "짧은 조문")],
        );
        let parts = pack_articles(&record, 120);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.chars().count() <= 120));
        assert!(parts[0].starts_with("제1조 "));
        assert!(parts[1].contains("제3조 짧은 조문"));
    }

    #[test]
    fn oversized_article_split_on_its_own() {
        let record = law("테스트법", "", &[("1", &"나".repeat(250))]);
        let parts = pack_articles(&record, 100);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.chars().count() <= 100));
    }

    fn cited(title: &str, number: &str) -> RetrievalResult {
        RetrievalResult {
            unit: RetrievableUnit {
                unit_id: RetrievableUnit::unit_id_for(title, number, 0),
                text: "본문".into(),
                law_title: title.into(),
                article_number: number.into(),
                part: 0,
            },
            score: 0.5,
        }
    }

    fn mentioned_ids(result: &AnalysisResult) -> Vec<&str> {
        result
            .mentioned_units()
            .iter()
            .map(|u| u.unit_id.as_str())
            .collect()
    }

    #[test]
    fn shared_article_numbers_need_the_law_title() {
        let cited_units = vec![
            cited("하도급법", "4"),
            cited("공정거래법", "4"),
            cited("공정거래법", "5"),
        ];
        let result = AnalysisResult {
            narrative: "### 적용 법령\n하도급법 제4조 위반 소지\n제5조 해당 없음".into(),
            cited_units: cited_units.clone(),
        };
        assert_eq!(mentioned_ids(&result), vec!["하도급법-4", "공정거래법-5"]);

        let result = AnalysisResult {
            narrative: "하도급법 제4조 및 공정거래법 제4조".into(),
            cited_units: cited_units.clone(),
        };
        assert_eq!(mentioned_ids(&result), vec!["하도급법-4", "공정거래법-4"]);

        let result = AnalysisResult {
            narrative: "제4조에 따르면".into(),
            cited_units,
        };
        assert!(mentioned_ids(&result).is_empty());
    }

    #[test]
    fn article_mentions_ignore_suffixed_articles() {
        assert!(names_article("하도급법 제4조에 따르면", "4"));
        assert!(!names_article("하도급법 제4조의2에 따르면", "4"));
        assert!(names_article("제4조의2 위반", "제4조의2"));
        assert!(!names_article("제14조 위반", "4"));
    }
}
