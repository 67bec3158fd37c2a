//! Configuration for an early-stopping run.
//!
//! [`EarlyStoppingConfig`] is the programmatic form, built once through
//! [`EarlyStoppingConfigBuilder`] and handed to the trainer.
//! [`SupervisorSettings`] is the file-driven form, loaded with `figment` in
//! layers: defaults -> user config -> workspace config -> explicit file ->
//! environment (`EARLYSTOP_` prefix, `__` as the nesting separator).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::saver::{InMemoryModelSaver, LocalFileModelSaver, ModelSaver};
use crate::score::ScoreCalculator;
use crate::termination::{
    BestScore, EpochTerminationCondition, InvalidScore, IterationTerminationCondition, MaxEpochs,
    MaxScore, MaxTime, NoImprovementInNEpochs,
};

/// Everything the supervisor needs besides the trainable process itself.
pub struct EarlyStoppingConfig<M> {
    pub(crate) epoch_conditions: Vec<Box<dyn EpochTerminationCondition>>,
    pub(crate) iteration_conditions: Vec<Box<dyn IterationTerminationCondition>>,
    pub(crate) score_calculator: Option<Box<dyn ScoreCalculator<M>>>,
    pub(crate) model_saver: Box<dyn ModelSaver<M>>,
    pub(crate) log_dispatch: Option<tracing::Dispatch>,
}

impl<M> EarlyStoppingConfig<M> {
    pub fn builder() -> EarlyStoppingConfigBuilder<M> {
        EarlyStoppingConfigBuilder::default()
    }

    pub fn epoch_conditions(&self) -> &[Box<dyn EpochTerminationCondition>] {
        &self.epoch_conditions
    }

    pub fn iteration_conditions(&self) -> &[Box<dyn IterationTerminationCondition>] {
        &self.iteration_conditions
    }

    pub fn epoch_condition_descriptions(&self) -> Vec<String> {
        self.epoch_conditions.iter().map(|c| c.describe()).collect()
    }

    pub fn iteration_condition_descriptions(&self) -> Vec<String> {
        self.iteration_conditions.iter().map(|c| c.describe()).collect()
    }

    pub fn has_score_calculator(&self) -> bool {
        self.score_calculator.is_some()
    }

    pub fn model_saver(&self) -> &dyn ModelSaver<M> {
        self.model_saver.as_ref()
    }
}

impl<M> fmt::Debug for EarlyStoppingConfig<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EarlyStoppingConfig")
            .field("epoch_conditions", &self.epoch_condition_descriptions())
            .field("iteration_conditions", &self.iteration_condition_descriptions())
            .field("score_calculator", &self.score_calculator.is_some())
            .field("log_dispatch", &self.log_dispatch.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`EarlyStoppingConfig`].
///
/// Without an explicit saver the config keeps candidates in an
/// [`InMemoryModelSaver`].
pub struct EarlyStoppingConfigBuilder<M> {
    epoch_conditions: Vec<Box<dyn EpochTerminationCondition>>,
    iteration_conditions: Vec<Box<dyn IterationTerminationCondition>>,
    score_calculator: Option<Box<dyn ScoreCalculator<M>>>,
    model_saver: Option<Box<dyn ModelSaver<M>>>,
    log_dispatch: Option<tracing::Dispatch>,
}

impl<M> Default for EarlyStoppingConfigBuilder<M> {
    fn default() -> Self {
        Self {
            epoch_conditions: Vec::new(),
            iteration_conditions: Vec::new(),
            score_calculator: None,
            model_saver: None,
            log_dispatch: None,
        }
    }
}

impl<M> EarlyStoppingConfigBuilder<M> {
    pub fn epoch_termination_condition(
        mut self,
        condition: impl EpochTerminationCondition + 'static,
    ) -> Self {
        self.epoch_conditions.push(Box::new(condition));
        self
    }

    pub fn epoch_termination_conditions(
        mut self,
        conditions: impl IntoIterator<Item = Box<dyn EpochTerminationCondition>>,
    ) -> Self {
        self.epoch_conditions.extend(conditions);
        self
    }

    pub fn iteration_termination_condition(
        mut self,
        condition: impl IterationTerminationCondition + 'static,
    ) -> Self {
        self.iteration_conditions.push(Box::new(condition));
        self
    }

    pub fn iteration_termination_conditions(
        mut self,
        conditions: impl IntoIterator<Item = Box<dyn IterationTerminationCondition>>,
    ) -> Self {
        self.iteration_conditions.extend(conditions);
        self
    }

    pub fn score_calculator(mut self, calculator: impl ScoreCalculator<M> + 'static) -> Self {
        self.score_calculator = Some(Box::new(calculator));
        self
    }

    pub fn model_saver(mut self, saver: impl ModelSaver<M> + 'static) -> Self {
        self.model_saver = Some(Box::new(saver));
        self
    }

    pub fn boxed_model_saver(mut self, saver: Box<dyn ModelSaver<M>>) -> Self {
        self.model_saver = Some(saver);
        self
    }

    /// Route the run's log events to `dispatch` instead of the global subscriber.
    pub fn log_dispatch(mut self, dispatch: tracing::Dispatch) -> Self {
        self.log_dispatch = Some(dispatch);
        self
    }
}

impl<M: Clone + Send + 'static> EarlyStoppingConfigBuilder<M> {
    /// Finish the configuration. A config without any termination condition
    /// would never halt and is rejected.
    pub fn build(self) -> Result<EarlyStoppingConfig<M>, ConfigError> {
        if self.epoch_conditions.is_empty() && self.iteration_conditions.is_empty() {
            return Err(ConfigError::NoTerminationConditions);
        }
        Ok(EarlyStoppingConfig {
            epoch_conditions: self.epoch_conditions,
            iteration_conditions: self.iteration_conditions,
            score_calculator: self.score_calculator,
            model_saver: self
                .model_saver
                .unwrap_or_else(|| Box::new(InMemoryModelSaver::<M>::new())),
            log_dispatch: self.log_dispatch,
        })
    }
}

// ── File-driven settings ───────────────────────────────────────────────────

/// An epoch-level condition as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EpochConditionSettings {
    MaxEpochs {
        max_epochs: usize,
    },
    NoImprovement {
        patience: usize,
        #[serde(default)]
        min_improvement: f64,
    },
    BestScore {
        target: f64,
    },
}

impl EpochConditionSettings {
    pub fn build(&self) -> Box<dyn EpochTerminationCondition> {
        match *self {
            EpochConditionSettings::MaxEpochs { max_epochs } => Box::new(MaxEpochs::new(max_epochs)),
            EpochConditionSettings::NoImprovement {
                patience,
                min_improvement,
            } => Box::new(NoImprovementInNEpochs::with_min_improvement(
                patience,
                min_improvement,
            )),
            EpochConditionSettings::BestScore { target } => Box::new(BestScore::new(target)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            EpochConditionSettings::MaxEpochs { max_epochs: 0 } => {
                Err(invalid("max_epochs must be at least 1"))
            }
            EpochConditionSettings::NoImprovement { patience: 0, .. } => {
                Err(invalid("no_improvement patience must be at least 1"))
            }
            EpochConditionSettings::NoImprovement {
                min_improvement, ..
            } if !(min_improvement >= 0.0) => {
                Err(invalid("no_improvement min_improvement must be non-negative"))
            }
            EpochConditionSettings::BestScore { target } if !target.is_finite() => {
                Err(invalid("best_score target must be finite"))
            }
            _ => Ok(()),
        }
    }
}

/// An iteration-level condition as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IterationConditionSettings {
    MaxTime { seconds: f64 },
    MaxScore { max_score: f64 },
    InvalidScore,
}

impl IterationConditionSettings {
    pub fn build(&self) -> Box<dyn IterationTerminationCondition> {
        match *self {
            IterationConditionSettings::MaxTime { seconds } => {
                Box::new(MaxTime::new(Duration::from_secs_f64(seconds)))
            }
            IterationConditionSettings::MaxScore { max_score } => Box::new(MaxScore::new(max_score)),
            IterationConditionSettings::InvalidScore => Box::new(InvalidScore),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            IterationConditionSettings::MaxTime { seconds }
                if !(seconds.is_finite() && seconds > 0.0) =>
            {
                Err(invalid("max_time seconds must be a positive number"))
            }
            IterationConditionSettings::MaxScore { max_score } if max_score.is_nan() => {
                Err(invalid("max_score must not be NaN"))
            }
            _ => Ok(()),
        }
    }
}

/// Where candidate models are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaverSettings {
    #[default]
    InMemory,
    LocalFile {
        directory: PathBuf,
    },
}

impl SaverSettings {
    pub fn build<M>(&self) -> Box<dyn ModelSaver<M>>
    where
        M: Clone + Send + Serialize + DeserializeOwned + 'static,
    {
        match self {
            SaverSettings::InMemory => Box::new(InMemoryModelSaver::new()),
            SaverSettings::LocalFile { directory } => {
                Box::new(LocalFileModelSaver::new(directory.clone()))
            }
        }
    }
}

/// Serialisable supervisor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Whether to compute a validation score after every epoch.
    pub score_validation: bool,
    pub saver: SaverSettings,
    pub epoch_conditions: Vec<EpochConditionSettings>,
    pub iteration_conditions: Vec<IterationConditionSettings>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            score_validation: true,
            saver: SaverSettings::InMemory,
            epoch_conditions: vec![
                EpochConditionSettings::MaxEpochs { max_epochs: 100 },
                EpochConditionSettings::NoImprovement {
                    patience: 5,
                    min_improvement: 0.0,
                },
            ],
            iteration_conditions: vec![
                IterationConditionSettings::MaxTime { seconds: 3600.0 },
                IterationConditionSettings::InvalidScore,
            ],
        }
    }
}

impl SupervisorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epoch_conditions.is_empty() && self.iteration_conditions.is_empty() {
            return Err(ConfigError::NoTerminationConditions);
        }
        for condition in &self.epoch_conditions {
            condition.validate()?;
        }
        for condition in &self.iteration_conditions {
            condition.validate()?;
        }
        Ok(())
    }

    /// Render as TOML, the format `load_settings` reads back.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    /// A builder pre-populated with these conditions and saver. The score
    /// calculator is model-specific and left to the caller.
    pub fn to_builder<M>(&self) -> EarlyStoppingConfigBuilder<M>
    where
        M: Clone + Send + Serialize + DeserializeOwned + 'static,
    {
        EarlyStoppingConfig::builder()
            .epoch_termination_conditions(self.epoch_conditions.iter().map(|c| c.build()))
            .iteration_termination_conditions(self.iteration_conditions.iter().map(|c| c.build()))
            .boxed_model_saver(self.saver.build())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

/// Path of the workspace-level settings file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".earlystop").join("config.toml")
}

/// Load settings from layered sources and validate them.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`EARLYSTOP_SCORE_VALIDATION`, `EARLYSTOP_SAVER__TYPE`, ...)
/// 2. Explicit config file
/// 3. Workspace-local config (`.earlystop/config.toml`)
/// 4. User config (`~/.config/earlystop/config.toml`)
/// 5. Built-in defaults
pub fn load_settings(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<SupervisorSettings, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(SupervisorSettings::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "earlystop", "earlystop") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::ParseError {
                message: format!("config file not found: {}", path.display()),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("EARLYSTOP_").split("__"));

    let settings: SupervisorSettings =
        figment
            .extract()
            .map_err(|e: figment::Error| ConfigError::ParseError {
                message: e.to_string(),
            })?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_builder_rejects_no_conditions() {
        let err = EarlyStoppingConfig::<f64>::builder().build().unwrap_err();
        assert!(matches!(err, ConfigError::NoTerminationConditions));
    }

    #[test]
    fn test_builder_keeps_order() {
        let config = EarlyStoppingConfig::<f64>::builder()
            .epoch_termination_condition(MaxEpochs::new(10))
            .epoch_termination_condition(NoImprovementInNEpochs::new(3))
            .iteration_termination_condition(MaxScore::new(7.5))
            .build()
            .unwrap();
        assert_eq!(
            config.epoch_condition_descriptions(),
            vec![
                "MaxEpochs(10)".to_string(),
                "NoImprovementInNEpochs(3, min_improvement=0)".to_string()
            ]
        );
        assert_eq!(config.iteration_condition_descriptions(), vec!["MaxScore(7.5)"]);
        assert!(!config.has_score_calculator());
        assert!(config.model_saver().get_best().unwrap().is_none());
    }

    #[test]
    fn test_iteration_only_config_is_valid() {
        let config = EarlyStoppingConfig::<f64>::builder()
            .iteration_termination_condition(MaxTime::from_secs(1))
            .build();
        assert!(config.is_ok());
    }

    #[test]
    fn test_default_settings_validate() {
        let settings = SupervisorSettings::default();
        settings.validate().unwrap();
        let config = settings.to_builder::<Vec<f64>>().build().unwrap();
        assert_eq!(config.epoch_conditions().len(), 2);
        assert_eq!(config.iteration_conditions().len(), 2);
    }

    #[test]
    fn test_settings_toml_roundtrip() {
        let settings = SupervisorSettings::default();
        let text = settings.to_toml().unwrap();
        assert!(text.contains("type = \"max_epochs\""));
        let parsed: SupervisorSettings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_settings_validation_errors() {
        let mut settings = SupervisorSettings::default();
        settings.epoch_conditions = vec![EpochConditionSettings::MaxEpochs { max_epochs: 0 }];
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid { .. })));

        settings.epoch_conditions.clear();
        settings.iteration_conditions = vec![IterationConditionSettings::MaxTime { seconds: -1.0 }];
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid { .. })));

        settings.iteration_conditions.clear();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::NoTerminationConditions)
        ));
    }

    #[test]
    fn test_load_settings_from_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
score_validation = false

[saver]
type = "local_file"
directory = "/tmp/earlystop-run"

[[epoch_conditions]]
type = "max_epochs"
max_epochs = 7

[[iteration_conditions]]
type = "max_score"
max_score = 7.5
"#,
        )
        .unwrap();

        let settings = load_settings(None, Some(&path)).unwrap();
        assert!(!settings.score_validation);
        assert_eq!(
            settings.epoch_conditions,
            vec![EpochConditionSettings::MaxEpochs { max_epochs: 7 }]
        );
        assert_eq!(
            settings.iteration_conditions,
            vec![IterationConditionSettings::MaxScore { max_score: 7.5 }]
        );
        assert_eq!(
            settings.saver,
            SaverSettings::LocalFile {
                directory: PathBuf::from("/tmp/earlystop-run")
            }
        );
    }

    #[test]
    fn test_load_settings_missing_explicit_file() {
        let err = load_settings(None, Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_load_settings_reads_workspace_file() {
        let dir = TempDir::new().unwrap();
        let path = workspace_config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "[[epoch_conditions]]\ntype = \"best_score\"\ntarget = 0.01\n",
        )
        .unwrap();
        let settings = load_settings(Some(dir.path()), None).unwrap();
        assert_eq!(
            settings.epoch_conditions,
            vec![EpochConditionSettings::BestScore { target: 0.01 }]
        );
    }
}
