// ============================================================
// Layer 3 — Assembly Procedures
// ============================================================
// A procedure is one recording of somebody assembling (or
// disassembling) a toy, annotated step by step:
//
//   verb    this      that      label
//   attach  chassis   cabin     correct
//   attach  bumper    chassis   mistake
//   detach  bumper    chassis   correction
//
// Each row is a keystep. The MLM learns which keysteps fit
// into which context, so a keystep is one vocabulary word.

use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Annotation attached to every keystep row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepLabel {
    Correct,
    Correction,
    Mistake,
}

impl FromStr for StepLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "correct"    => Ok(StepLabel::Correct),
            "correction" => Ok(StepLabel::Correction),
            "mistake"    => Ok(StepLabel::Mistake),
            other        => bail!("unknown step label '{other}'"),
        }
    }
}

/// `verb-this-that`, e.g. `attach-cabin-chassis`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keystep {
    pub verb: String,
    pub this: String,
    pub that: String,
}

impl Keystep {
    pub fn new(verb: &str, this: &str, that: &str) -> Self {
        Self {
            verb: verb.trim().to_string(),
            this: this.trim().to_string(),
            that: that.trim().to_string(),
        }
    }

    /// Single whitespace-free vocabulary word.
    /// Multi-word parts ("arm connector") are joined with '_'.
    pub fn token(&self) -> String {
        format!(
            "{}-{}-{}",
            word(&self.verb),
            word(&self.this),
            word(&self.that)
        )
    }
}

fn word(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Who recorded which toy, parsed from the recording file name.
///
/// Names look like `nusar-2021_action_both_9011-c03f_9011_user_id_..._0.csv`:
/// the fourth '_' part is `user-toy`, the last part is the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureMeta {
    pub user:  String,
    pub toy:   String,
    pub index: String,
}

impl ProcedureMeta {
    pub fn from_file_name(name: &str) -> Result<Self> {
        let stem  = name.split('.').next().unwrap_or(name);
        let parts: Vec<&str> = stem.split('_').collect();

        let Some(user_toy) = parts.get(3) else {
            bail!("file name '{name}' has no user-toy part");
        };
        let Some((user, toy)) = user_toy.split_once('-') else {
            bail!("file name '{name}' has a malformed user-toy part '{user_toy}'");
        };
        let index = parts.last().copied().unwrap_or_default();

        Ok(Self {
            user:  user.to_string(),
            toy:   toy.to_string(),
            index: index.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    pub meta:     ProcedureMeta,
    pub keysteps: Vec<Keystep>,
    pub labels:   Vec<StepLabel>,
}

impl Procedure {
    /// A procedure is correct when no step carries a mistake
    /// or correction label.
    pub fn is_correct(&self) -> bool {
        !self.labels.is_empty() && self.labels.iter().all(|l| *l == StepLabel::Correct)
    }

    pub fn tokens(&self) -> Vec<String> {
        self.keysteps.iter().map(Keystep::token).collect()
    }
}

/// Which recordings to train on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureFilter {
    All,
    Correct,
    Mistake,
}

impl ProcedureFilter {
    pub fn keeps(&self, p: &Procedure) -> bool {
        match self {
            ProcedureFilter::All     => true,
            ProcedureFilter::Correct => p.is_correct(),
            ProcedureFilter::Mistake => !p.is_correct(),
        }
    }
}
