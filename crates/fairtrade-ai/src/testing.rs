//! Deterministic in-process backends for tests.
//!
//! [`KeywordEmbedder`] hashes character unigrams and bigrams into a fixed
//! number of buckets, so texts sharing vocabulary land close together without
//! any model. [`ScriptedGenerator`] records prompts and replays canned output.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::{AiError, EmbeddingProvider, Generator, Prompt};

pub struct KeywordEmbedder {
    dims: usize,
    calls: AtomicUsize,
    fail_after: Option<usize>,
    delay: Option<Duration>,
}

impl KeywordEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
            fail_after: None,
            delay: None,
        }
    }

    /// Succeed for the first `n` batch calls, then report the backend as down.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Sleep before every batch, to exercise caller timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        for c in &chars {
            v[bucket(&c.to_string(), self.dims)] += 1.0;
        }
        for pair in chars.windows(2) {
            let gram: String = pair.iter().collect();
            v[bucket(&gram, self.dims)] += 2.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

/// FNV-1a bucket for a token.
fn bucket(token: &str, dims: usize) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % dims as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|n| call >= n) {
            return Err(AiError::Unavailable("embedding service unreachable".into()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "keyword-hash"
    }
}

pub struct ScriptedGenerator {
    default_reply: String,
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<Prompt>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    /// Every call succeeds with `reply` unless a scripted reply is queued.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            default_reply: reply.into(),
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Queue `n` failures carrying `message` ahead of the default reply.
    pub fn fail_next(self, n: usize, message: &str) -> Self {
        {
            let mut replies = self.replies.lock().unwrap();
            for _ in 0..n {
                replies.push_back(Err(message.to_string()));
            }
        }
        self
    }

    /// Queue a specific successful reply.
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
        self
    }

    /// Sleep before answering, to exercise caller timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String, AiError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(AiError::Unavailable(message)),
            None => Ok(self.default_reply.clone()),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn shared_vocabulary_is_closer() {
        let embedder = KeywordEmbedder::new(256);
        let query = embedder.vector("하도급 대금 삭감");
        let near = embedder.vector("원사업자는 하도급대금을 부당하게 감액하여서는 아니 된다");
        let far = embedder.vector("시장지배적사업자의 지위 남용 금지");
        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[test]
    fn vectors_are_unit_length() {
        let embedder = KeywordEmbedder::new(64);
        let v = embedder.vector("공정거래");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn failing_after_counts_batches() {
        let embedder = KeywordEmbedder::new(8).failing_after(1);
        assert!(embedder.embed("가").await.is_ok());
        assert!(matches!(
            embedder.embed("나").await,
            Err(AiError::Unavailable(_))
        ));
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn scripted_replies_in_order() {
        let generator = ScriptedGenerator::new("기본")
            .fail_next(1, "503")
            .then_reply("두번째");
        let prompt = Prompt::new("s", "u");
        assert!(generator.generate(&prompt).await.is_err());
        assert_eq!(generator.generate(&prompt).await.unwrap(), "두번째");
        assert_eq!(generator.generate(&prompt).await.unwrap(), "기본");
        assert_eq!(generator.calls(), 3);
    }
}
