/// One selectable local chat model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub const DEFAULT_CHAT_MODEL: &str = "Llama-3.2-3B-Instruct-q4f16_1-MLC";

pub fn default_local_models() -> Vec<Model> {
    vec![
        Model::new(DEFAULT_CHAT_MODEL, "Llama 3.2 3B Instruct")
            .with_description("Balanced default, needs a recent GPU"),
        Model::new("Llama-3.2-1B-Instruct-q4f16_1-MLC", "Llama 3.2 1B Instruct")
            .with_description("Smaller and faster, weaker at the action format"),
        Model::new("Phi-3.5-mini-instruct-q4f16_1-MLC", "Phi 3.5 Mini Instruct"),
        Model::new("Qwen2.5-3B-Instruct-q4f16_1-MLC", "Qwen 2.5 3B Instruct"),
    ]
}

/// Looks up a model by id, falling back to a bare id entry for custom models.
pub fn find_model(models: &[Model], model_id: &str) -> Model {
    models
        .iter()
        .find(|model| model.id == model_id)
        .cloned()
        .unwrap_or_else(|| Model::from_id(model_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_leads_with_default_model() {
        let models = default_local_models();
        assert_eq!(models[0].id, DEFAULT_CHAT_MODEL);
        assert!(models.iter().all(|model| !model.name.is_empty()));
    }

    #[test]
    fn unknown_model_falls_back_to_bare_id() {
        let model = find_model(&default_local_models(), "custom-gguf");
        assert_eq!(model, Model::from_id("custom-gguf"));
        assert_eq!(model.description, None);
    }
}
