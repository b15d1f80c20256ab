use std::collections::BTreeMap;

use regex::Regex;

use crate::config::{AnchorConfig, DecoratorSpec};

/// A user-toggleable decorator backed by a real model attribute named by
/// `id`. `value` mirrors whether the current selection carries the
/// attribute; it is transient state, rewritten on every command refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualDecorator {
    pub id: String,
    pub label: String,
    pub attributes: BTreeMap<String, String>,
    pub default_value: bool,
    pub value: Option<bool>,
}

pub type AutomaticCallback = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// A stateless rule deriving presentation attributes from the anchor value.
/// Never persisted into the model.
pub struct AutomaticDecorator {
    pub id: String,
    pub callback: AutomaticCallback,
    pub attributes: BTreeMap<String, String>,
}

/// Ordered automatic-decorator rules. Later-added rules overwrite attribute
/// keys set by earlier ones during rendering.
#[derive(Default)]
pub struct AutomaticDecorators {
    entries: Vec<AutomaticDecorator>,
}

impl AutomaticDecorators {
    pub fn add(&mut self, decorator: AutomaticDecorator) {
        self.entries.push(decorator);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AutomaticDecorator> {
        self.entries.iter()
    }

    /// Union of the attribute sets of every rule matching `anchor_value`,
    /// evaluated in registration order.
    pub fn attributes_for(&self, anchor_value: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for decorator in &self.entries {
            if (decorator.callback)(anchor_value) {
                for (name, value) in &decorator.attributes {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoratorMode {
    Manual,
    Automatic,
}

/// A normalized configuration entry, tagged with its mode.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoratorDefinition {
    pub id: String,
    pub spec: DecoratorSpec,
}

impl DecoratorDefinition {
    pub fn mode(&self) -> DecoratorMode {
        match self.spec {
            DecoratorSpec::Manual { .. } => DecoratorMode::Manual,
            DecoratorSpec::Automatic { .. } => DecoratorMode::Automatic,
        }
    }
}

/// Converts the raw decorator mapping into tagged definitions. Config is
/// best-effort: unknown or malformed entries are dropped with a warning,
/// never an error.
pub fn normalize_decorators(
    raw: &BTreeMap<String, serde_json::Value>,
) -> Vec<DecoratorDefinition> {
    let mut out = Vec::new();
    for (id, value) in raw {
        match serde_json::from_value::<DecoratorSpec>(value.clone()) {
            Ok(spec) => out.push(DecoratorDefinition {
                id: id.clone(),
                spec,
            }),
            Err(err) => {
                tracing::warn!(decorator = %id, %err, "dropping malformed decorator config entry");
            }
        }
    }
    out
}

#[derive(Default)]
pub struct DecoratorRegistry {
    manual: Vec<ManualDecorator>,
    automatic: AutomaticDecorators,
}

impl DecoratorRegistry {
    pub fn from_config(config: &AnchorConfig) -> Self {
        let mut registry = Self::default();

        // Registered first so configured rules can overwrite its attributes.
        if config.add_target_to_external_anchors {
            registry.automatic.add(external_anchor_decorator());
        }

        for definition in normalize_decorators(&config.decorators) {
            registry.install(definition);
        }
        registry
    }

    pub fn install(&mut self, definition: DecoratorDefinition) {
        let DecoratorDefinition { id, spec } = definition;
        match spec {
            DecoratorSpec::Manual {
                label,
                attributes,
                default_value,
            } => {
                self.manual.push(ManualDecorator {
                    label: label.unwrap_or_else(|| id.clone()),
                    id,
                    attributes,
                    default_value,
                    value: None,
                });
            }
            DecoratorSpec::Automatic {
                pattern,
                attributes,
            } => match Regex::new(&pattern) {
                Ok(re) => self.automatic.add(AutomaticDecorator {
                    id,
                    callback: Box::new(move |value| re.is_match(value)),
                    attributes,
                }),
                Err(err) => {
                    tracing::warn!(decorator = %id, %err, "dropping automatic decorator with invalid pattern");
                }
            },
        }
    }

    pub fn add_automatic(
        &mut self,
        id: impl Into<String>,
        callback: AutomaticCallback,
        attributes: BTreeMap<String, String>,
    ) {
        self.automatic.add(AutomaticDecorator {
            id: id.into(),
            callback,
            attributes,
        });
    }

    pub fn manual(&self) -> &[ManualDecorator] {
        &self.manual
    }

    pub fn manual_mut(&mut self) -> impl Iterator<Item = &mut ManualDecorator> {
        self.manual.iter_mut()
    }

    pub fn manual_ids(&self) -> impl Iterator<Item = &str> {
        self.manual.iter().map(|d| d.id.as_str())
    }

    pub fn automatic(&self) -> &AutomaticDecorators {
        &self.automatic
    }
}

pub(crate) const EXTERNAL_DECORATOR_ID: &str = "anchorIsExternal";

fn external_anchor_decorator() -> AutomaticDecorator {
    let mut attributes = BTreeMap::new();
    attributes.insert("target".to_string(), "_blank".to_string());
    attributes.insert("rel".to_string(), "noopener noreferrer".to_string());
    AutomaticDecorator {
        id: EXTERNAL_DECORATOR_ID.to_string(),
        callback: Box::new(|value| {
            value.starts_with("http://") || value.starts_with("https://") || value.starts_with("//")
        }),
        attributes,
    }
}
