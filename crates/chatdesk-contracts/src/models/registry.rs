use indexmap::IndexMap;

pub const TEXT: &str = "text";
/// Model accepts an inline image alongside the prompt.
pub const VISION: &str = "vision";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    /// Name of the `TextProvider` that serves this model.
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities.iter().map(|item| (*item).to_string()).collect(),
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }

    pub fn accepts_images(&self) -> bool {
        self.supports(VISION)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    /// Text models in catalogue order.
    pub fn text_models(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values().filter(|model| model.supports(TEXT))
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Insertion order matters: the first usable text model is the default.
fn default_models() -> IndexMap<String, ModelSpec> {
    [
        ModelSpec::new("gemini-1.5-flash", "gemini", &[TEXT, VISION]),
        ModelSpec::new("gemini-2.0-flash", "gemini", &[TEXT, VISION]),
        ModelSpec::new("gemini-2.5-flash", "gemini", &[TEXT, VISION]),
        ModelSpec::new("gemini-2.5-pro", "gemini", &[TEXT, VISION]),
        ModelSpec::new("gemini-1.0-pro", "gemini", &[TEXT]),
        ModelSpec::new("dryrun-text-1", "dryrun", &[TEXT, VISION]),
    ]
    .into_iter()
    .map(|model| (model.name.clone(), model))
    .collect()
}
