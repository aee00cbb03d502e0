// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and loads the keystep tokenizer.
//
// Every keystep (`attach-cabin-chassis`) is one vocabulary word,
// so the tokenizer is a HuggingFace WordLevel model over a
// whitespace-split input. The JSON is written directly, which
// sidesteps the trainer/ModelWrapper type mismatch in
// tokenizers 0.15.
//
// Reserved ids:
//   [PAD]  = 0   batch padding, ignored by the loss
//   [UNK]  = 1   keysteps unseen when the vocabulary was built
//   [MASK] = 2   replaces masked positions

use anyhow::{Context, Result};
use std::{collections::HashMap, path::PathBuf};
use tokenizers::Tokenizer;

pub const PAD_TOKEN:  &str = "[PAD]";
pub const UNK_TOKEN:  &str = "[UNK]";
pub const MASK_TOKEN: &str = "[MASK]";

const SPECIAL_TOKENS: [&str; 3] = [PAD_TOKEN, UNK_TOKEN, MASK_TOKEN];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: PathBuf::from(dir.into()) }
    }

    /// Load existing tokenizer or build a new one from keystep sequences
    pub fn load_or_build(
        &self,
        sequences: &[Vec<String>],
        max_vocab: usize,
    ) -> Result<KeystepTokenizer> {
        let tok_path = self.dir.join("tokenizer.json");
        if tok_path.exists() {
            tracing::info!("Loading existing tokenizer from disk");
            self.load()
        } else {
            tracing::info!("Building new keystep tokenizer (max_vocab={})", max_vocab);
            self.build_and_save(sequences, max_vocab)
        }
    }

    pub fn load(&self) -> Result<KeystepTokenizer> {
        let path = self.dir.join("tokenizer.json");
        let inner = Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!(
                "Cannot load tokenizer from '{}': {}", path.display(), e
            ))?;
        KeystepTokenizer::new(inner)
    }

    fn build_and_save(&self, sequences: &[Vec<String>], max_vocab: usize) -> Result<KeystepTokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Keystep frequencies ───────────────────────────────────────────────
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for seq in sequences {
            for token in seq {
                *freq.entry(token.as_str()).or_insert(0) += 1;
            }
        }

        // Most frequent first; ties by name so the ids are stable
        let mut words: Vec<(&str, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        words.truncate(max_vocab.saturating_sub(SPECIAL_TOKENS.len()));

        // ── Vocab JSON ────────────────────────────────────────────────────────
        let mut vocab = serde_json::Map::new();
        for (id, special) in SPECIAL_TOKENS.iter().enumerate() {
            vocab.insert(special.to_string(), serde_json::json!(id));
        }
        for (word, _) in &words {
            let id = vocab.len();
            vocab.insert(word.to_string(), serde_json::json!(id));
        }

        let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
            .iter()
            .enumerate()
            .map(|(id, content)| serde_json::json!({
                "id": id, "content": content, "single_word": false,
                "lstrip": false, "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": null,
            "pre_tokenizer": { "type": "WhitespaceSplit" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let tok_path = self.dir.join("tokenizer.json");
        std::fs::write(&tok_path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| "Cannot write tokenizer JSON")?;

        tracing::info!(
            "Tokenizer built with {} keysteps, saved to '{}'",
            words.len(),
            tok_path.display()
        );

        let inner = Tokenizer::from_file(&tok_path)
            .map_err(|e| anyhow::anyhow!("Cannot reload tokenizer: {e}"))?;
        KeystepTokenizer::new(inner)
    }
}

// ─── KeystepTokenizer ─────────────────────────────────────────────────────────

/// The tokenizer plus its resolved special ids.
pub struct KeystepTokenizer {
    inner:   Tokenizer,
    pad_id:  u32,
    mask_id: u32,
}

impl KeystepTokenizer {
    pub fn new(inner: Tokenizer) -> Result<Self> {
        let id = |t: &str| {
            inner
                .token_to_id(t)
                .with_context(|| format!("tokenizer has no {t} token"))
        };
        let pad_id  = id(PAD_TOKEN)?;
        let mask_id = id(MASK_TOKEN)?;
        Ok(Self { inner, pad_id, mask_id })
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn mask_id(&self) -> u32 {
        self.mask_id
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    pub fn encode(&self, keysteps: &[String]) -> Result<Vec<u32>> {
        let enc = self
            .inner
            .encode(keysteps.join(" "), false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        Ok(enc.get_ids().to_vec())
    }

    pub fn id_to_token(&self, id: u32) -> Option<String> {
        self.inner.id_to_token(id)
    }
}
