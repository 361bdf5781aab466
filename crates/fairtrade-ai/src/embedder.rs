//! Local ONNX Runtime embeddings for offline indexing.
//!
//! Runs a multilingual sentence-transformers export (default
//! `multilingual-e5-small`, 384 dimensions) with mean pooling over the
//! attention mask. The model directory must contain `model.onnx` and
//! `tokenizer.json`. Inference is CPU-bound, so it runs on the blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::{AiError, EmbeddingProvider};

/// Korean statute articles run long; truncate to the model's window.
const MAX_TOKENS: usize = 512;

struct Model {
    session: Session,
    tokenizer: Tokenizer,
    dim: usize,
}

/// [`EmbeddingProvider`] backed by an ONNX sentence embedding model.
pub struct OnnxEmbeddings {
    model: Arc<Mutex<Model>>,
    name: String,
    dim: usize,
}

fn onnx_err(e: impl std::fmt::Display) -> AiError {
    AiError::Unavailable(format!("onnx: {e}"))
}

impl OnnxEmbeddings {
    /// Load a model directory containing `model.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path) -> Result<Self, AiError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(AiError::Unavailable(format!("{} not found", path.display())));
            }
        }

        let session = Session::builder()
            .map_err(onnx_err)?
            .commit_from_file(&model_path)
            .map_err(onnx_err)?;
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(onnx_err)?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(onnx_err)?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        info!(dim, model = %model_path.display(), "loaded embedding model");
        Ok(Self {
            model: Arc::new(Mutex::new(Model {
                session,
                tokenizer,
                dim,
            })),
            name,
            dim,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| AiError::Unavailable("embedding model lock poisoned".into()))?;
            model.run(&texts)
        })
        .await
        .map_err(|e| AiError::Unavailable(format!("embedding task failed: {e}")))?
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

impl Model {
    fn run(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        let batch_size = texts.len();
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self.tokenizer.encode_batch(inputs, true).map_err(onnx_err)?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        // Flat [batch_size, seq_len] inputs.
        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut token_type_ids = vec![0i64; batch_size * seq_len];
        for (i, encoding) in encodings.iter().enumerate() {
            let row = i * seq_len;
            let fields = encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids());
            for (j, ((&id, &mask), &tid)) in fields.enumerate() {
                input_ids[row + j] = id as i64;
                attention_mask[row + j] = mask as i64;
                token_type_ids[row + j] = tid as i64;
            }
        }

        let shape = [batch_size as i64, seq_len as i64];
        let ids = Tensor::from_array((shape, input_ids.into_boxed_slice())).map_err(onnx_err)?;
        let mask = Tensor::from_array((shape, attention_mask.clone().into_boxed_slice()))
            .map_err(onnx_err)?;
        let types =
            Tensor::from_array((shape, token_type_ids.into_boxed_slice())).map_err(onnx_err)?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
                "token_type_ids" => types,
            ])
            .map_err(onnx_err)?;

        // Token embeddings: [batch_size, seq_len, dim].
        let (output_shape, hidden) = outputs[0].try_extract_tensor::<f32>().map_err(onnx_err)?;
        let dims: &[i64] = output_shape;
        if dims.len() != 3 || dims[0] as usize != batch_size || dims[2] as usize != self.dim {
            return Err(AiError::Malformed(format!(
                "unexpected output shape {dims:?}, expected [{batch_size}, {seq_len}, {}]",
                self.dim
            )));
        }

        let out_len = dims[1] as usize;
        Ok((0..batch_size)
            .map(|i| {
                let mask_row = &attention_mask[i * seq_len..(i + 1) * seq_len];
                let hidden_row = &hidden[i * out_len * self.dim..(i + 1) * out_len * self.dim];
                mean_pool(hidden_row, mask_row, self.dim)
            })
            .collect())
    }
}

/// Attention-masked mean over token vectors, then L2-normalised.
fn mean_pool(hidden: &[f32], mask: &[i64], dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut count = 0.0f32;
    for (token, &m) in hidden.chunks_exact(dim).zip(mask) {
        if m > 0 {
            for (p, &x) in pooled.iter_mut().zip(token) {
                *p += x;
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        for p in &mut pooled {
            *p /= count;
        }
    }
    let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for p in &mut pooled {
            *p /= norm;
        }
    }
    pooled
}

/// Last dimension of the model output is the embedding width.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
