//! Declarative model descriptions, as written in comparison plans.

use crate::error::ModelFitError;
use crate::models::{
    Arima, ArimaConfig, Lstm, LstmConfig, Prophet, ProphetConfig, SharedModel, Xgboost,
    XgboostConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A candidate model and its hyperparameters.
///
/// Serialized with a `kind` tag next to the config fields:
///
/// ```
/// use demand_backtest::models::ModelSpec;
///
/// let spec: ModelSpec = toml::from_str(r#"
///     kind = "arima"
///     p = 2
/// "#).unwrap();
/// let model = spec.build().unwrap();
/// assert_eq!(model.name(), "ARIMA");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelSpec {
    Arima(ArimaConfig),
    Xgboost(XgboostConfig),
    Prophet(ProphetConfig),
    Lstm(LstmConfig),
}

impl ModelSpec {
    /// Validate the configuration and build a shareable model.
    pub fn build(&self) -> Result<SharedModel, ModelFitError> {
        Ok(match self {
            ModelSpec::Arima(config) => Arc::new(Arima::new(*config)?),
            ModelSpec::Xgboost(config) => Arc::new(Xgboost::new(config.clone())?),
            ModelSpec::Prophet(config) => Arc::new(Prophet::new(config.clone())?),
            ModelSpec::Lstm(config) => Arc::new(Lstm::new(config.clone())?),
        })
    }

    /// Short lowercase kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            ModelSpec::Arima(_) => "arima",
            ModelSpec::Xgboost(_) => "xgboost",
            ModelSpec::Prophet(_) => "prophet",
            ModelSpec::Lstm(_) => "lstm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_each_kind_with_defaults() {
        let specs = [
            ModelSpec::Arima(ArimaConfig::default()),
            ModelSpec::Xgboost(XgboostConfig::default()),
            ModelSpec::Prophet(ProphetConfig::default()),
            ModelSpec::Lstm(LstmConfig::default()),
        ];
        let names: Vec<String> = specs
            .iter()
            .map(|s| s.build().unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["ARIMA", "XGBoost", "Prophet", "LSTM"]);
    }

    #[test]
    fn tagged_json_shape() {
        let json = serde_json::to_value(ModelSpec::Lstm(LstmConfig::default())).unwrap();
        assert_eq!(json["kind"], "lstm");
        assert_eq!(json["lookback"], 12);
    }

    #[test]
    fn invalid_config_fails_to_build() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"kind": "xgboost", "learning_rate": 0.0}"#).unwrap();
        assert_eq!(spec.kind(), "xgboost");
        assert!(matches!(
            spec.build(),
            Err(ModelFitError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(serde_json::from_str::<ModelSpec>(r#"{"kind": "garch"}"#).is_err());
    }
}
