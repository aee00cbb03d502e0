// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands off to Layer 2.
//
//   1. `train`   — trains the masked keystep model
//   2. `predict` — ranks candidates for the final keystep
//
// Exit status: 0 on success, 1 on any error, 130 when a
// training run was interrupted.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

/// Status of a run cut short by Ctrl-C (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "procedure-mlm",
    version = "0.1.0",
    about = "Train a masked-language model on assembly procedure keysteps, then predict the next step."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<ExitCode> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<ExitCode> {
    use crate::application::train_use_case::TrainUseCase;
    use crate::infra::signal::install_interrupt_handler;

    let config = TrainConfig::try_from(args)?;
    tracing::info!("Starting training on procedures in: {}", config.data_dir);

    let use_case = TrainUseCase::new(config)?;
    install_interrupt_handler(&use_case.stop_signal())?;
    let metrics = use_case.execute()?;

    match metrics.last_validation {
        Some(v) => println!(
            "Epoch {}: validation loss {:.4}, masked accuracy {:.2}%",
            v.epoch, v.loss, v.accuracy * 100.0
        ),
        None => println!("No validation pass completed."),
    }

    if metrics.complete {
        println!("Training complete after {} epochs ({} steps).", metrics.epochs_completed, metrics.steps);
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "Training interrupted after {} completed epochs ({} steps).",
            metrics.epochs_completed, metrics.steps
        );
        Ok(ExitCode::from(EXIT_INTERRUPTED))
    }
}

fn run_predict(args: PredictArgs) -> Result<ExitCode> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case   = PredictUseCase::new(&args.checkpoint_dir)?;
    let prediction = use_case.predict(&args.keysteps, args.top_k)?;

    println!("\nHidden keystep: {}", prediction.hidden);
    for (rank, (keystep, prob)) in prediction.candidates.iter().enumerate() {
        let marker = if *keystep == prediction.hidden { "  <" } else { "" };
        println!("{:>2}. {:<40} {:>6.2}%{}", rank + 1, keystep, prob * 100.0, marker);
    }
    Ok(ExitCode::SUCCESS)
}
