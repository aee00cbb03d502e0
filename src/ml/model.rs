// ============================================================
// Layer 5 — Masked Keystep Encoder
// ============================================================
// A bidirectional transformer encoder that reads a procedure
// with some keysteps replaced by [MASK] and predicts, at every
// position, which keystep belongs there:
//
//   ids ─► token emb + position emb ─► N × EncoderBlock
//       ─► LayerNorm ─► Linear(d_model → vocab) ─► logits
//
// Padding slots are excluded from attention through the
// key-padding mask and from the loss through [PAD] labels.
//
// Reference: Burn Book §3 (Modules), §6 (Custom Training Loop)

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::MlmBatcher;
use crate::domain::config::ModelKind;
use crate::domain::sequence::MaskedExample;
use crate::domain::traits::{BatchScore, MaskedLmModel};
use crate::infra::checkpoint::CheckpointManager;

pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
pub type InferBackend = burn::backend::Wgpu;

/// Encoder size for each model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Architecture {
    pub d_model:    usize,
    pub num_heads:  usize,
    pub num_layers: usize,
    pub d_ff:       usize,
}

impl Architecture {
    pub fn for_kind(kind: ModelKind) -> Self {
        match kind {
            ModelKind::KeystepTiny  => Self { d_model: 64,  num_heads: 2, num_layers: 2, d_ff: 256 },
            ModelKind::KeystepSmall => Self { d_model: 128, num_heads: 4, num_layers: 4, d_ff: 512 },
            ModelKind::KeystepBase  => Self { d_model: 256, num_heads: 8, num_layers: 6, d_ff: 1024 },
        }
    }
}

// #[derive(Config)] brings its own Clone and serde impls.
#[derive(Config, Debug)]
pub struct MlmEncoderConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
}

impl MlmEncoderConfig {
    pub fn for_kind(kind: ModelKind, vocab_size: usize, max_seq_len: usize, dropout: f64) -> Self {
        let arch = Architecture::for_kind(kind);
        Self::new(
            vocab_size, max_seq_len, arch.d_model,
            arch.num_heads, arch.num_layers, arch.d_ff, dropout,
        )
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> MlmEncoder<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let lm_head    = LinearConfig::new(self.d_model, self.vocab_size).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        MlmEncoder {
            token_embedding, position_embedding, layers,
            final_norm, lm_head, dropout,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_output = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

/// Bidirectional encoder with a vocabulary-sized head: every
/// position predicts which keystep belongs there.
#[derive(Module, Debug)]
pub struct MlmEncoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub lm_head:            Linear<B>,
    pub dropout:            Dropout,
}

impl<B: Backend> MlmEncoder<B> {
    /// input_ids: [batch, seq_len] → logits: [batch, seq_len, vocab]
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();

        let tok_emb = self.token_embedding.forward(input_ids);

        // learned absolute positions, one row per slot
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        self.lm_head.forward(self.final_norm.forward(x))
    }

    /// Cross-entropy over masked slots only; `labels` holds `pad_id`
    /// everywhere else. Returns the loss and the flattened logits
    /// [batch * seq_len, vocab].
    pub fn forward_loss(
        &self,
        input_ids: Tensor<B, 2, Int>,
        pad_mask:  Tensor<B, 2, Bool>,
        labels:    Tensor<B, 1, Int>,
        pad_id:    u32,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(input_ids, pad_mask);
        let [batch_size, seq_len, vocab] = logits.dims();
        let logits = logits.reshape([batch_size * seq_len, vocab]);

        let ce = CrossEntropyLossConfig::new()
            .with_pad_tokens(Some(vec![pad_id as usize]))
            .init(&logits.device());
        let loss = ce.forward(logits.clone(), labels);
        (loss, logits)
    }
}

/// (hits, masked slots) for one batch.
fn masked_hits<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>, pad_id: u32) -> (usize, usize) {
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    let counted   = labels.clone().not_equal_elem(pad_id as i32).int();

    let masked: i64 = counted.clone().sum().into_scalar().elem::<i64>();
    let hits: i64 = predicted
        .equal(labels)
        .int()
        .mul(counted)
        .sum()
        .into_scalar()
        .elem::<i64>();
    (hits as usize, masked as usize)
}

// ─── MaskedLmModel adapter ────────────────────────────────────────────────────

/// Encoder + Adam behind the MaskedLmModel trait.
///
/// `forward_loss` keeps the loss graph until `optimizer_step`
/// consumes it. Validation runs on the inner backend (no autodiff,
/// dropout off), refreshed after every optimizer step.
pub struct BurnMlm<B: AutodiffBackend, O: Optimizer<MlmEncoder<B>, B>> {
    model:         MlmEncoder<B>,
    optim:         O,
    lr:            f64,
    pad_id:        u32,
    batcher:       MlmBatcher<B>,
    valid_batcher: MlmBatcher<B::InnerBackend>,
    valid_model:   Option<MlmEncoder<B::InnerBackend>>,
    pending_loss:  Option<Tensor<B, 1>>,
    checkpoints:   Option<CheckpointManager>,
}

/// Builds the encoder and an Adam optimiser for it.
pub fn with_adam<B: AutodiffBackend>(
    config: &MlmEncoderConfig,
    lr:     f64,
    pad_id: u32,
    device: &B::Device,
) -> BurnMlm<B, impl Optimizer<MlmEncoder<B>, B>> {
    let model: MlmEncoder<B> = config.init(device);
    let optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, MlmEncoder<B>>();
    BurnMlm::new(model, optim, lr, pad_id, device.clone())
}

impl<B: AutodiffBackend, O: Optimizer<MlmEncoder<B>, B>> BurnMlm<B, O> {
    pub fn new(model: MlmEncoder<B>, optim: O, lr: f64, pad_id: u32, device: B::Device) -> Self {
        let inner_device = device.clone();
        Self {
            model,
            optim,
            lr,
            pad_id,
            batcher:       MlmBatcher::new(device, pad_id),
            valid_batcher: MlmBatcher::new(inner_device, pad_id),
            valid_model:   None,
            pending_loss:  None,
            checkpoints:   None,
        }
    }

    /// Save a checkpoint after every validation pass.
    pub fn with_checkpoints(mut self, manager: CheckpointManager) -> Self {
        self.checkpoints = Some(manager);
        self
    }
}

impl<B: AutodiffBackend, O: Optimizer<MlmEncoder<B>, B>> MaskedLmModel for BurnMlm<B, O> {
    fn forward_loss(&mut self, batch: &[MaskedExample]) -> Result<BatchScore> {
        if batch.is_empty() {
            bail!("empty batch");
        }
        let batch = self.batcher.batch(batch);
        let (loss, logits) = self.model.forward_loss(
            batch.input_ids,
            batch.pad_mask,
            batch.labels.clone(),
            self.pad_id,
        );

        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
        if !loss_val.is_finite() {
            bail!("loss is not finite ({loss_val})");
        }
        let (correct, masked) = masked_hits(logits.detach(), batch.labels, self.pad_id);

        self.pending_loss = Some(loss);
        Ok(BatchScore { loss: loss_val, correct, masked })
    }

    fn optimizer_step(&mut self) -> Result<()> {
        let Some(loss) = self.pending_loss.take() else {
            bail!("optimizer step without a preceding forward pass");
        };
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.lr, self.model.clone(), grads);
        self.valid_model = None;
        Ok(())
    }

    fn evaluate(&mut self, batch: &[MaskedExample]) -> Result<BatchScore> {
        if batch.is_empty() {
            bail!("empty batch");
        }
        let model = self.valid_model.get_or_insert_with(|| self.model.valid());
        let batch = self.valid_batcher.batch(batch);
        let (loss, logits) = model.forward_loss(
            batch.input_ids,
            batch.pad_mask,
            batch.labels.clone(),
            self.pad_id,
        );

        let loss_val: f64 = loss.into_scalar().elem::<f64>();
        if !loss_val.is_finite() {
            bail!("validation loss is not finite ({loss_val})");
        }
        let (correct, masked) = masked_hits(logits, batch.labels, self.pad_id);
        Ok(BatchScore { loss: loss_val, correct, masked })
    }

    fn checkpoint(&mut self, epoch: usize) -> Result<()> {
        if let Some(manager) = &self.checkpoints {
            manager.save_model(&self.model, epoch)?;
            tracing::info!("Checkpoint saved for epoch {}", epoch);
        }
        Ok(())
    }
}
