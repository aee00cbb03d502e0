// ============================================================
// Layer 3 — Immutable Run Configuration
// ============================================================
// Every value here is validated once, in its constructor.
// A value that exists is a value that is valid, so nothing
// downstream re-checks ranges.
//
// Reference: Rust Book §9.3 (Creating custom types for validation)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::MlmError;

// ─── Masking ──────────────────────────────────────────────────────────────────

/// Which rule selects the masked positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum MaskingStrategy {
    /// Every position is masked independently with `probability`.
    Prob { probability: f64 },

    /// The trailing span is masked. Its length is
    /// `max(1, round(fraction * len))`, or exactly one token when no
    /// fraction is set. END carries no probability: a probability
    /// supplied alongside it is ignored.
    End { fraction: Option<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MaskingConfigRaw")]
pub struct MaskingConfig {
    strategy: MaskingStrategy,
}

/// Wire form of [`MaskingConfig`]; deserialization goes through the
/// same range checks as the constructors.
#[derive(Deserialize)]
struct MaskingConfigRaw {
    strategy: MaskingStrategy,
}

impl TryFrom<MaskingConfigRaw> for MaskingConfig {
    type Error = MlmError;

    fn try_from(raw: MaskingConfigRaw) -> Result<Self, Self::Error> {
        match raw.strategy {
            MaskingStrategy::Prob { probability } => Self::prob(probability),
            MaskingStrategy::End { fraction } => Self::end(fraction),
        }
    }
}

impl MaskingConfig {
    pub fn prob(probability: f64) -> Result<Self, MlmError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(MlmError::invalid(
                "probability",
                format!("{probability} is outside [0, 1]"),
            ));
        }
        Ok(Self { strategy: MaskingStrategy::Prob { probability } })
    }

    pub fn end(fraction: Option<f64>) -> Result<Self, MlmError> {
        if let Some(f) = fraction {
            if !(f > 0.0 && f <= 1.0) {
                return Err(MlmError::invalid(
                    "end_fraction",
                    format!("{f} is outside (0, 1]"),
                ));
            }
        }
        Ok(Self { strategy: MaskingStrategy::End { fraction } })
    }

    /// Launcher entry point: builds the config from the raw option set.
    ///
    /// PROB requires a probability. END ignores it, and says so in the
    /// log instead of accepting it silently.
    pub fn from_options(
        strategy:     StrategyKind,
        probability:  Option<f64>,
        end_fraction: Option<f64>,
    ) -> Result<Self, MlmError> {
        match strategy {
            StrategyKind::Prob => {
                let p = probability.ok_or_else(|| {
                    MlmError::invalid("probability", "required by the PROB masking strategy")
                })?;
                if end_fraction.is_some() {
                    tracing::warn!("--end-fraction is ignored by the PROB masking strategy");
                }
                Self::prob(p)
            }
            StrategyKind::End => {
                if let Some(p) = probability {
                    tracing::warn!(
                        probability = p,
                        "masking probability is ignored by the END masking strategy"
                    );
                }
                Self::end(end_fraction)
            }
        }
    }

    pub fn strategy(&self) -> MaskingStrategy {
        self.strategy
    }
}

/// Strategy tag without parameters, as chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    Prob,
    End,
}

// ─── Model family ─────────────────────────────────────────────────────────────

/// The model/tokenizer pair the launcher builds. All families share
/// the keystep word-level tokenizer and differ in encoder size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    KeystepTiny,
    KeystepSmall,
    KeystepBase,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] =
        [ModelKind::KeystepTiny, ModelKind::KeystepSmall, ModelKind::KeystepBase];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::KeystepTiny  => "keystep-tiny",
            ModelKind::KeystepSmall => "keystep-small",
            ModelKind::KeystepBase  => "keystep-base",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = MlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = ModelKind::ALL.iter().map(|k| k.as_str()).collect();
                MlmError::invalid(
                    "model_kind",
                    format!("unknown model family '{s}' (expected one of {})", known.join(", ")),
                )
            })
    }
}

// ─── Training schedule ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TrainingConfigRaw")]
pub struct TrainingConfig {
    epochs:         usize,
    validate_every: usize,
    model_kind:     ModelKind,
}

#[derive(Deserialize)]
struct TrainingConfigRaw {
    epochs:         usize,
    validate_every: usize,
    model_kind:     ModelKind,
}

impl TryFrom<TrainingConfigRaw> for TrainingConfig {
    type Error = MlmError;

    fn try_from(raw: TrainingConfigRaw) -> Result<Self, Self::Error> {
        Self::new(raw.epochs, raw.validate_every, raw.model_kind)
    }
}

impl TrainingConfig {
    pub fn new(epochs: usize, validate_every: usize, model_kind: ModelKind) -> Result<Self, MlmError> {
        if epochs == 0 {
            return Err(MlmError::invalid("epochs", "must be a positive integer"));
        }
        if validate_every == 0 {
            return Err(MlmError::invalid("validate_every", "must be a positive integer"));
        }
        if validate_every > epochs {
            return Err(MlmError::invalid(
                "validate_every",
                format!("{validate_every} exceeds the epoch count {epochs}"),
            ));
        }
        Ok(Self { epochs, validate_every, model_kind })
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn validate_every(&self) -> usize {
        self.validate_every
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model_kind
    }

    /// 1-indexed. The final epoch always validates.
    pub fn should_validate(&self, epoch: usize) -> bool {
        epoch % self.validate_every == 0 || epoch == self.epochs
    }

    pub fn validation_epochs(&self) -> Vec<usize> {
        (1..=self.epochs).filter(|&e| self.should_validate(e)).collect()
    }
}

// ─── Run identity ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    Enabled,
    Disabled,
}

/// Who this run is, for the tracking sink. Built once at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub name:  String,
    pub group: String,
    pub mode:  TrackingMode,
}

impl RunIdentity {
    pub fn new(name: impl Into<String>, group: impl Into<String>, mode: TrackingMode) -> Self {
        Self { name: name.into(), group: group.into(), mode }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_every_tenth_of_hundred() {
        let cfg = TrainingConfig::new(100, 10, ModelKind::KeystepTiny).unwrap();
        let expected: Vec<usize> = (1..=10).map(|i| i * 10).collect();
        assert_eq!(cfg.validation_epochs(), expected);
    }

    #[test]
    fn test_final_epoch_always_validates() {
        let cfg = TrainingConfig::new(3, 2, ModelKind::KeystepTiny).unwrap();
        assert_eq!(cfg.validation_epochs(), vec![2, 3]);
    }

    #[test]
    fn test_cadence_of_one_validates_every_epoch() {
        let cfg = TrainingConfig::new(4, 1, ModelKind::KeystepTiny).unwrap();
        assert_eq!(cfg.validation_epochs(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_schedule_rejects_bad_values() {
        let zero_epochs = TrainingConfig::new(0, 1, ModelKind::KeystepTiny).unwrap_err();
        assert!(matches!(zero_epochs, MlmError::InvalidConfig { field: "epochs", .. }));

        let zero_cadence = TrainingConfig::new(5, 0, ModelKind::KeystepTiny).unwrap_err();
        assert!(matches!(zero_cadence, MlmError::InvalidConfig { field: "validate_every", .. }));

        let too_sparse = TrainingConfig::new(5, 6, ModelKind::KeystepTiny).unwrap_err();
        assert!(matches!(too_sparse, MlmError::InvalidConfig { field: "validate_every", .. }));
    }

    #[test]
    fn test_probability_range() {
        assert!(MaskingConfig::prob(0.0).is_ok());
        assert!(MaskingConfig::prob(1.0).is_ok());
        assert!(MaskingConfig::prob(1.5).is_err());
        assert!(MaskingConfig::prob(-0.1).is_err());
        assert!(MaskingConfig::prob(f64::NAN).is_err());
    }

    #[test]
    fn test_end_ignores_probability_option() {
        // 1.5 would be rejected under PROB, END never looks at it
        let cfg = MaskingConfig::from_options(StrategyKind::End, Some(1.5), None).unwrap();
        assert_eq!(cfg.strategy(), MaskingStrategy::End { fraction: None });
    }

    #[test]
    fn test_prob_requires_probability() {
        let err = MaskingConfig::from_options(StrategyKind::Prob, None, None).unwrap_err();
        assert!(matches!(err, MlmError::InvalidConfig { field: "probability", .. }));
    }

    #[test]
    fn test_end_fraction_range() {
        assert!(MaskingConfig::end(Some(0.0)).is_err());
        assert!(MaskingConfig::end(Some(1.2)).is_err());
        assert!(MaskingConfig::end(Some(1.0)).is_ok());
    }

    #[test]
    fn test_model_kind_parse() {
        assert_eq!("keystep-small".parse::<ModelKind>().unwrap(), ModelKind::KeystepSmall);
        let err = "gpt-9".parse::<ModelKind>().unwrap_err();
        assert!(matches!(err, MlmError::InvalidConfig { field: "model_kind", .. }));
    }

    #[test]
    fn test_deserialized_masking_is_range_checked() {
        let ok = r#"{"strategy":{"strategy":"prob","probability":0.15}}"#;
        let cfg: MaskingConfig = serde_json::from_str(ok).unwrap();
        assert_eq!(cfg.strategy(), MaskingStrategy::Prob { probability: 0.15 });

        let bad = r#"{"strategy":{"strategy":"prob","probability":1.5}}"#;
        let err = serde_json::from_str::<MaskingConfig>(bad).unwrap_err();
        assert!(err.to_string().contains("probability"));

        let bad_end = r#"{"strategy":{"strategy":"end","fraction":0.0}}"#;
        assert!(serde_json::from_str::<MaskingConfig>(bad_end).is_err());
    }

    #[test]
    fn test_deserialized_schedule_is_range_checked() {
        let cfg = TrainingConfig::new(4, 2, ModelKind::KeystepTiny).unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(serde_json::from_str::<TrainingConfig>(&json).unwrap(), cfg);

        let bad = json.replace("\"validate_every\":2", "\"validate_every\":5");
        assert_ne!(bad, json);
        let err = serde_json::from_str::<TrainingConfig>(&bad).unwrap_err();
        assert!(err.to_string().contains("validate_every"));

        let zero = json.replace("\"epochs\":4", "\"epochs\":0");
        assert!(serde_json::from_str::<TrainingConfig>(&zero).is_err());
    }
}
