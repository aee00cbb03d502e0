// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `predict`, and all
// their flags. The conversion into application configs is the
// layer boundary: option values are validated there, before any
// data is read.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::TrainConfig;
use crate::domain::config::{
    MaskingConfig, ModelKind, RunIdentity, StrategyKind, TrackingMode, TrainingConfig,
};
use crate::domain::error::MlmError;
use crate::domain::procedure::ProcedureFilter;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a masked keystep model on procedure recordings
    Train(TrainArgs),

    /// Predict the final keystep of a procedure with a trained checkpoint
    Predict(PredictArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskingArg {
    /// Random positions, each with --mask-prob
    Prob,
    /// The trailing span of each procedure
    End,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingArg {
    Enabled,
    Disabled,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceduresArg {
    All,
    Correct,
    Mistake,
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory of procedure CSV files (verb, this, that, label)
    #[arg(long, default_value = "data/procedures")]
    pub data_dir: String,

    /// Directory for checkpoints, tokenizer and train_config.json
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Root directory of the tracking sink
    #[arg(long, default_value = "runs")]
    pub runs_dir: String,

    /// Which recordings to train on
    #[arg(long, value_enum, default_value_t = ProceduresArg::All)]
    pub procedures: ProceduresArg,

    /// Model family: keystep-tiny, keystep-small or keystep-base
    #[arg(long, default_value = "keystep-small")]
    pub model: String,

    /// Masking strategy
    #[arg(long, value_enum)]
    pub masking: MaskingArg,

    /// Per-position masking probability (required by `prob`)
    #[arg(long)]
    pub mask_prob: Option<f64>,

    /// Fraction of the procedure hidden by `end`; one keystep when unset
    #[arg(long)]
    pub end_fraction: Option<f64>,

    /// Number of full passes through the training split
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Validate every N epochs (the final epoch always validates)
    #[arg(long, default_value_t = 1)]
    pub validate_every: usize,

    /// Tracking run name
    #[arg(long, default_value = "procedure-mlm")]
    pub run_name: String,

    /// Tracking run group
    #[arg(long, default_value = "default")]
    pub run_group: String,

    /// Experiment tracking mode
    #[arg(long, value_enum, default_value_t = TrackingArg::Enabled)]
    pub tracking: TrackingArg,

    /// Longest procedure the model reads; longer ones are truncated
    #[arg(long, default_value_t = 64)]
    pub max_seq_len: usize,

    /// Procedures per batch
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Dropout probability inside the encoder
    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Upper bound on vocabulary entries, special tokens included
    #[arg(long, default_value_t = 4096)]
    pub max_vocab: usize,

    /// Share of procedures used for training; the rest validates
    #[arg(long, default_value_t = 0.8)]
    pub train_fraction: f64,

    /// Seed for the split, shuffling and masking
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl From<MaskingArg> for StrategyKind {
    fn from(a: MaskingArg) -> Self {
        match a {
            MaskingArg::Prob => StrategyKind::Prob,
            MaskingArg::End  => StrategyKind::End,
        }
    }
}

impl From<TrackingArg> for TrackingMode {
    fn from(a: TrackingArg) -> Self {
        match a {
            TrackingArg::Enabled  => TrackingMode::Enabled,
            TrackingArg::Disabled => TrackingMode::Disabled,
        }
    }
}

impl From<ProceduresArg> for ProcedureFilter {
    fn from(a: ProceduresArg) -> Self {
        match a {
            ProceduresArg::All     => ProcedureFilter::All,
            ProceduresArg::Correct => ProcedureFilter::Correct,
            ProceduresArg::Mistake => ProcedureFilter::Mistake,
        }
    }
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl TryFrom<TrainArgs> for TrainConfig {
    type Error = MlmError;

    fn try_from(a: TrainArgs) -> Result<Self, Self::Error> {
        let model_kind: ModelKind = a.model.parse()?;
        let masking  = MaskingConfig::from_options(a.masking.into(), a.mask_prob, a.end_fraction)?;
        let training = TrainingConfig::new(a.epochs, a.validate_every, model_kind)?;

        let config = TrainConfig {
            data_dir:       a.data_dir,
            checkpoint_dir: a.checkpoint_dir,
            runs_dir:       a.runs_dir,
            procedures:     a.procedures.into(),
            training,
            masking,
            identity:       RunIdentity::new(a.run_name, a.run_group, a.tracking.into()),
            max_seq_len:    a.max_seq_len,
            batch_size:     a.batch_size,
            lr:             a.lr,
            dropout:        a.dropout,
            max_vocab:      a.max_vocab,
            vocab_size:     0,
            train_fraction: a.train_fraction,
            seed:           a.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Comma-separated keysteps, e.g. attach-cabin-chassis,attach-boom-arm
    #[arg(long, value_delimiter = ',', required = true)]
    pub keysteps: Vec<String>,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Number of candidates to print
    #[arg(long, default_value_t = 5)]
    pub top_k: usize,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::config::MaskingStrategy;
    use clap::Parser;

    fn train_args(extra: &[&str]) -> TrainArgs {
        let mut argv = vec!["procedure-mlm", "train"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Train(a) => a,
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn test_prob_options_become_config() {
        let args = train_args(&[
            "--masking", "prob", "--mask-prob", "0.15",
            "--epochs", "100", "--validate-every", "10",
            "--tracking", "disabled", "--model", "keystep-tiny",
        ]);
        let cfg = TrainConfig::try_from(args).unwrap();
        assert_eq!(cfg.masking.strategy(), MaskingStrategy::Prob { probability: 0.15 });
        assert_eq!(cfg.training.validation_epochs().len(), 10);
        assert_eq!(cfg.training.model_kind(), ModelKind::KeystepTiny);
        assert_eq!(cfg.identity.mode, TrackingMode::Disabled);
    }

    #[test]
    fn test_prob_without_probability_names_the_field() {
        let err = TrainConfig::try_from(train_args(&["--masking", "prob"])).unwrap_err();
        assert!(matches!(err, MlmError::InvalidConfig { field: "probability", .. }));
    }

    #[test]
    fn test_probability_out_of_range() {
        let args = train_args(&["--masking", "prob", "--mask-prob", "1.5"]);
        let err = TrainConfig::try_from(args).unwrap_err();
        assert!(matches!(err, MlmError::InvalidConfig { field: "probability", .. }));
    }

    #[test]
    fn test_end_ignores_probability() {
        let args = train_args(&["--masking", "end", "--mask-prob", "0.9"]);
        let cfg = TrainConfig::try_from(args).unwrap();
        assert_eq!(cfg.masking.strategy(), MaskingStrategy::End { fraction: None });
    }

    #[test]
    fn test_unknown_model_family() {
        let args = train_args(&["--masking", "end", "--model", "gpt-huge"]);
        let err = TrainConfig::try_from(args).unwrap_err();
        assert!(matches!(err, MlmError::InvalidConfig { field: "model_kind", .. }));
    }

    #[test]
    fn test_cadence_above_epochs() {
        let args = train_args(&["--masking", "end", "--epochs", "3", "--validate-every", "4"]);
        let err = TrainConfig::try_from(args).unwrap_err();
        assert!(matches!(err, MlmError::InvalidConfig { field: "validate_every", .. }));
    }

    #[test]
    fn test_predict_splits_keysteps() {
        let cli = Cli::parse_from(["procedure-mlm", "predict", "--keysteps", "a-b-c,d-e-f"]);
        match cli.command {
            Commands::Predict(a) => assert_eq!(a.keysteps, vec!["a-b-c", "d-e-f"]),
            other => panic!("expected predict, got {other:?}"),
        }
    }
}
