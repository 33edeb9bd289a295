/// ONNX Runtime embedder for `sentence-transformers/all-MiniLM-L6-v2`.
///
/// Runs the exported encoder, mean-pools the last hidden state with the
/// attention mask and L2-normalizes, which reproduces the model's
/// sentence-transformers pipeline.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use super::tokenizer::{BertTokenizer, DEFAULT_MAX_LENGTH};
use super::{Embedder, EmbedderError, MINILM_DIMENSIONS};

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn new(model_dir: &Path) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir, DEFAULT_MAX_LENGTH)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        info!(
            "Embedding model loaded from {} (vocab size: {}, max tokens: {})",
            model_dir.display(),
            tokenizer.vocab_size(),
            tokenizer.max_length()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions: MINILM_DIMENSIONS,
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty model output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encoded = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        let batch = encoded.len();
        let seq_len = match encoded.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => {
                return Err(EmbedderError::TokenizerError(
                    "tokenizer produced no tokens".to_string(),
                ));
            }
        };

        let mut input_ids = Vec::with_capacity(batch * seq_len);
        let mut attention_mask = Vec::with_capacity(batch * seq_len);
        let mut token_type_ids = Vec::with_capacity(batch * seq_len);
        for o in &encoded {
            input_ids.extend_from_slice(&o.input_ids);
            attention_mask.extend_from_slice(&o.attention_mask);
            token_type_ids.extend_from_slice(&o.token_type_ids);
        }

        let shape = [batch, seq_len];
        let input_ids_val = Tensor::from_array((shape, input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val = Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids_val = Tensor::from_array((shape, token_type_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // last_hidden_state: [batch, seq_len, hidden]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let row = seq_len * self.dimensions;
        if hidden.len() != batch * row {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} for batch {batch}x{seq_len}x{}",
                hidden.len(),
                self.dimensions
            )));
        }

        Ok((0..batch)
            .map(|b| {
                let pooled = mean_pooling(
                    &hidden[b * row..(b + 1) * row],
                    &attention_mask[b * seq_len..(b + 1) * seq_len],
                    self.dimensions,
                );
                l2_normalize(&pooled)
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Mean of token states weighted by the attention mask.
///
/// `hidden` is one sequence, laid out `[seq_len, hidden_size]`.
fn mean_pooling(hidden: &[f32], attention_mask: &[i64], hidden_size: usize) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum = 0.0f32;

    for (t, &mask) in attention_mask.iter().enumerate() {
        if mask == 0 {
            continue;
        }
        mask_sum += 1.0;
        let token = &hidden[t * hidden_size..(t + 1) * hidden_size];
        for (acc, v) in result.iter_mut().zip(token) {
            *acc += v;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}

fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }

    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}
