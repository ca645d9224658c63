//! The closed catalogue of things the assistant can do.
//!
//! The validator and the executor consult the same registry, so an action
//! is known exactly when it is dispatchable. Every catalogue entry must
//! have exactly one handler; this is checked when the registry is built,
//! not on first use.

use std::collections::BTreeMap;

use thiserror::Error;

use super::{ActionDescriptor, ActionHandler};
use crate::command::{CLARIFY, DENIED};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("action '{0}' is declared more than once")]
    DuplicateAction(String),

    #[error("'{0}' is reserved for translator passthrough replies")]
    ReservedName(String),

    #[error("no handler bound for action '{0}'")]
    Unbound(String),

    #[error("action '{0}' has more than one handler")]
    DuplicateHandler(String),

    #[error("handler bound to unknown action '{0}'")]
    UnknownHandler(String),
}

struct Entry {
    descriptor: &'static ActionDescriptor,
    handler: Box<dyn ActionHandler>,
}

pub struct ActionRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

/// Collects descriptors and handlers, then checks the binding is exact.
pub struct RegistryBuilder {
    catalogue: &'static [ActionDescriptor],
    handlers: Vec<(String, Box<dyn ActionHandler>)>,
}

impl RegistryBuilder {
    pub fn bind(mut self, action: &str, handler: impl ActionHandler + 'static) -> Self {
        self.handlers.push((action.to_string(), Box::new(handler)));
        self
    }

    pub fn build(self) -> Result<ActionRegistry, RegistryError> {
        let mut descriptors: BTreeMap<&'static str, &'static ActionDescriptor> = BTreeMap::new();
        for descriptor in self.catalogue {
            if descriptor.name == CLARIFY || descriptor.name == DENIED {
                return Err(RegistryError::ReservedName(descriptor.name.to_string()));
            }
            if descriptors.insert(descriptor.name, descriptor).is_some() {
                return Err(RegistryError::DuplicateAction(descriptor.name.to_string()));
            }
        }

        let mut entries = BTreeMap::new();
        for (action, handler) in self.handlers {
            let Some(&descriptor) = descriptors.get(action.as_str()) else {
                return Err(RegistryError::UnknownHandler(action));
            };
            if entries.contains_key(descriptor.name) {
                return Err(RegistryError::DuplicateHandler(action));
            }
            entries.insert(descriptor.name, Entry { descriptor, handler });
        }

        if let Some(unbound) = descriptors.keys().find(|name| !entries.contains_key(*name)) {
            return Err(RegistryError::Unbound(unbound.to_string()));
        }

        Ok(ActionRegistry { entries })
    }
}

impl ActionRegistry {
    pub fn builder(catalogue: &'static [ActionDescriptor]) -> RegistryBuilder {
        RegistryBuilder {
            catalogue,
            handlers: Vec::new(),
        }
    }

    /// The builtin catalogue with its handlers.
    pub fn builtin() -> Result<Self, RegistryError> {
        super::builtin::bind_all(Self::builder(super::builtin::CATALOGUE)).build()
    }

    pub fn descriptor(&self, action: &str) -> Option<&'static ActionDescriptor> {
        self.entries.get(action).map(|entry| entry.descriptor)
    }

    pub fn handler(&self, action: &str) -> Option<&dyn ActionHandler> {
        self.entries.get(action).map(|entry| entry.handler.as_ref())
    }

    /// Descriptors sorted by action name.
    pub fn descriptors(&self) -> impl Iterator<Item = &'static ActionDescriptor> + '_ {
        self.entries.values().map(|entry| entry.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// One line per action: `name(param: kind, …) [class]: description`.
    /// Used in the translator prompt and in `--actions`.
    pub fn catalogue_text(&self) -> String {
        self.descriptors()
            .map(|d| {
                let params = d
                    .parameters
                    .iter()
                    .map(|p| {
                        let kind = match p.kind {
                            super::ParamKind::Path => "path",
                            super::ParamKind::String => "string",
                            super::ParamKind::OptionalString => "optional string",
                        };
                        format!("{}: {kind}", p.name)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- {}({params}) [{}]: {}", d.name, d.side_effect, d.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
