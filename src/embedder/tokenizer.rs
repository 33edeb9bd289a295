/// WordPiece tokenizer wrapper around HuggingFace `tokenizers`.
///
/// Produces the three input tensors a BERT-family sentence encoder expects.
use std::path::Path;

use anyhow::Result;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};

/// `all-MiniLM-L6-v2` was trained with 256-token windows.
pub const DEFAULT_MAX_LENGTH: usize = 256;

pub struct BertTokenizer {
    inner: Tokenizer,
    max_length: usize,
}

/// Encoded inputs for one text, padded to the longest text of its batch.
#[derive(Debug, Clone)]
pub struct TokenizerOutput {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl TokenizerOutput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

impl BertTokenizer {
    /// Load `tokenizer.json` from the model directory.
    pub fn from_model_dir(model_dir: &Path, max_length: usize) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;

        // BatchLongest is the default strategy
        inner.with_padding(Some(PaddingParams::default()));

        Ok(Self { inner, max_length })
    }

    /// Tokenize a batch; all outputs share the same sequence length.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<Vec<TokenizerOutput>> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;

        Ok(encodings
            .iter()
            .map(|enc| TokenizerOutput {
                input_ids: widen(enc.get_ids()),
                attention_mask: widen(enc.get_attention_mask()),
                token_type_ids: widen(enc.get_type_ids()),
            })
            .collect())
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

fn widen(values: &[u32]) -> Vec<i64> {
    values.iter().map(|&v| i64::from(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::download::default_model_dir;

    #[test]
    #[ignore]
    fn test_tokenize_batch_with_real_model() {
        let model_dir = default_model_dir();
        if !model_dir.join("tokenizer.json").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(&model_dir, DEFAULT_MAX_LENGTH).unwrap();
        let outputs = tokenizer
            .tokenize_batch(&["bail", "anticipatory bail under section 438"])
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].len(), outputs[1].len());
        assert_eq!(outputs[0].attention_mask.iter().filter(|&&m| m == 1).count(), 3);
        assert!(!outputs[0].is_empty());
        assert!(tokenizer.vocab_size() > 30_000);
        assert_eq!(tokenizer.max_length(), DEFAULT_MAX_LENGTH);
    }

    #[test]
    fn test_output_len() {
        let output = TokenizerOutput {
            input_ids: vec![101, 102],
            attention_mask: vec![1, 1],
            token_type_ids: vec![0, 0],
        };
        assert_eq!(output.len(), 2);
        assert!(!output.is_empty());
    }

    #[test]
    fn test_tokenizer_missing_file() {
        let result = BertTokenizer::from_model_dir(Path::new("/nonexistent/path"), 256);
        assert!(result.is_err());
    }

    #[test]
    fn test_widen() {
        assert_eq!(widen(&[0, 101, 102]), vec![0i64, 101, 102]);
    }
}
