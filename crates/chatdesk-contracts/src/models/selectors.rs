use thiserror::Error;

use super::registry::{ModelRegistry, ModelSpec, TEXT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    /// Set when the requested name was not a known text model and the
    /// default was used in its place. Ready to show to the user.
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("model '{model}' needs provider '{provider}', which is not configured")]
    ProviderUnavailable { model: String, provider: String },
    #[error("no text model has a configured provider")]
    NoTextModel,
}

/// Picks the text model for a session. Only models whose provider is
/// available are ever chosen.
#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    /// A known text model is used as asked, or refused when `available` says
    /// its provider is missing. Blank or unknown names get the first
    /// available text model; only unknown names carry a fallback reason.
    pub fn select(
        &self,
        requested: Option<&str>,
        available: impl Fn(&ModelSpec) -> bool,
    ) -> Result<ModelSelection, SelectionError> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());
        if let Some(model) = requested
            .and_then(|name| self.registry.get(name))
            .filter(|model| model.supports(TEXT))
        {
            if !available(model) {
                return Err(SelectionError::ProviderUnavailable {
                    model: model.name.clone(),
                    provider: model.provider.clone(),
                });
            }
            return Ok(ModelSelection {
                model: model.clone(),
                fallback_reason: None,
            });
        }

        let Some(default) = self.registry.text_models().find(|model| available(*model)) else {
            return Err(SelectionError::NoTextModel);
        };
        Ok(ModelSelection {
            model: default.clone(),
            fallback_reason: requested
                .map(|name| format!("Unknown model '{name}'; using {}.", default.name)),
        })
    }
}
