//! CLI subcommand handlers.

use crate::demo::{self, DatasetSpec, LinearModel};
use crate::{Commands, ConfigAction, OutputFormat, RunArgs};
use earlystop_core::config::workspace_config_path;
use earlystop_core::{
    DataSetLossCalculator, EarlyStoppingResult, EarlyStoppingTrainer, EpochConditionSettings,
    IterationConditionSettings, LoggingListener, ModelTrainer, RunSummary, SaverSettings,
    SupervisorSettings, load_settings,
};
use serde::Serialize;
use std::path::Path;

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => handle_run(&args, workspace, config_file),
        Commands::Config { action } => handle_config(action, workspace, config_file),
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    summary: RunSummary,
    model: LinearModel,
}

fn handle_run(args: &RunArgs, workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<()> {
    if args.samples < demo::MIN_SAMPLES {
        anyhow::bail!(
            "--samples must be at least {} to leave both training and validation data (got {})",
            demo::MIN_SAMPLES,
            args.samples
        );
    }
    let mut settings = load_settings(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    apply_overrides(&mut settings, args, workspace);
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid settings: {}", e))?;

    let result = run_demo(&settings, args)?;
    print_result(&result, args.output)
}

/// Fold command-line flags into the loaded settings.
fn apply_overrides(settings: &mut SupervisorSettings, args: &RunArgs, workspace: &Path) {
    if let Some(max_epochs) = args.epochs {
        settings
            .epoch_conditions
            .retain(|c| !matches!(c, EpochConditionSettings::MaxEpochs { .. }));
        settings
            .epoch_conditions
            .insert(0, EpochConditionSettings::MaxEpochs { max_epochs });
    }
    if let Some(seconds) = args.max_time {
        settings
            .iteration_conditions
            .retain(|c| !matches!(c, IterationConditionSettings::MaxTime { .. }));
        settings
            .iteration_conditions
            .insert(0, IterationConditionSettings::MaxTime { seconds });
    }
    // Relative checkpoint directories live under the workspace.
    if let SaverSettings::LocalFile { directory } = &mut settings.saver {
        if directory.is_relative() {
            *directory = workspace.join(&*directory);
        }
    }
}

fn run_demo(
    settings: &SupervisorSettings,
    args: &RunArgs,
) -> anyhow::Result<EarlyStoppingResult<LinearModel>> {
    let spec = DatasetSpec {
        features: args.features,
        samples: args.samples,
        batch_size: args.batch_size,
        seed: args.seed,
        ..DatasetSpec::default()
    };
    let data = demo::generate(&spec);
    tracing::debug!(
        train_batches = data.train.len(),
        validation_batches = data.validation.len(),
        true_weights = ?data.true_weights,
        true_bias = data.true_bias,
        "Generated synthetic dataset"
    );

    let mut builder = settings.to_builder::<LinearModel>();
    if settings.score_validation {
        builder = builder.score_calculator(DataSetLossCalculator::new(data.validation, true));
    }
    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let trainable = ModelTrainer::new(LinearModel::new(spec.features, args.learning_rate), data.train);
    let mut trainer = EarlyStoppingTrainer::new(config, trainable).with_listener(LoggingListener);
    Ok(trainer.fit()?)
}

fn print_result(result: &EarlyStoppingResult<LinearModel>, output: OutputFormat) -> anyhow::Result<()> {
    match output {
        OutputFormat::Json => {
            let report = RunReport {
                summary: result.summary(),
                model: result.best_model.clone(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("{result}");
            for (epoch, score) in &result.score_vs_epoch {
                let marker = if Some(*epoch) == result.best_model_epoch {
                    " *"
                } else {
                    ""
                };
                println!("  epoch {epoch:>4}: {score:.6}{marker}");
            }
            println!(
                "Best model: weights={:?} bias={:.4}",
                result.best_model.weights, result.best_model.bias
            );
            println!("Elapsed: {:.2}s", result.elapsed.as_secs_f64());
        }
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = SupervisorSettings::default().to_toml()?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show { output } => {
            let settings = load_settings(Some(workspace), config_file)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            match output {
                OutputFormat::Text => println!("{}", settings.to_toml()?),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
            }
            Ok(())
        }
    }
}
