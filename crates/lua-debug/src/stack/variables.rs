//! Variable arena entries and lazy resolution.
//! - insert_locals: root variable + one child per local slot
//! - variables: resolve a reference and list its children
//! - value_path: rebuild the interpreter path from parent ids

use crate::error::{DebugError, Result};
use crate::protocol::{Variable, VariablePresentationHint, VariablesArguments, VariablesFilter};
use crate::runtime::{DebugRuntime, RuntimeValue, ValueKey, ValuePath};

use super::format::{describe_scalar, UNEVALUATED};
use super::StackGraph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum VariableKey {
    /// Synthetic container of a frame's locals.
    Root,
    Local { name: String, slot: u32 },
    Field(String),
    Index(i64),
}

impl VariableKey {
    fn display_name(&self) -> String {
        match self {
            Self::Root => "Locals".to_string(),
            Self::Local { name, .. } | Self::Field(name) => name.clone(),
            Self::Index(index) => index.to_string(),
        }
    }

    fn is_indexed(&self) -> bool {
        matches!(self, Self::Index(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Parent {
    Frame(u32),
    Variable(u32),
}

#[derive(Debug)]
pub(super) struct VariableEntry {
    key: VariableKey,
    parent: Parent,
    resolved: Option<Variable>,
    children: Vec<u32>,
}

impl VariableEntry {
    fn new(key: VariableKey, parent: Parent) -> Self {
        Self {
            key,
            parent,
            resolved: None,
            children: Vec::new(),
        }
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn property_hint() -> Option<VariablePresentationHint> {
    Some(VariablePresentationHint {
        kind: Some("property".to_string()),
    })
}

impl StackGraph {
    /// Adds the locals root of `frame_id` with one unresolved child per slot.
    pub(super) fn insert_locals(&mut self, frame_id: u32, names: Vec<String>) -> u32 {
        let root = self.ids.next();
        let mut children = Vec::with_capacity(names.len());
        for (idx, name) in names.into_iter().enumerate() {
            let child = self.ids.next();
            let slot = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            self.variables.insert(
                child,
                VariableEntry::new(VariableKey::Local { name, slot }, Parent::Variable(root)),
            );
            children.push(child);
        }

        let mut entry = VariableEntry::new(VariableKey::Root, Parent::Frame(frame_id));
        entry.resolved = Some(Variable {
            name: VariableKey::Root.display_name(),
            value: String::new(),
            r#type: None,
            presentation_hint: None,
            variables_reference: root,
            named_variables: Some(count(children.len())),
            indexed_variables: None,
        });
        entry.children = children;
        self.variables.insert(root, entry);
        root
    }

    /// Children of `args.variables_reference`, resolved, filtered and paged.
    pub fn variables(
        &mut self,
        runtime: &mut dyn DebugRuntime,
        args: &VariablesArguments,
    ) -> Result<Vec<Variable>> {
        let id = args.variables_reference;
        if !self.variables.contains_key(&id) {
            return Err(DebugError::UnknownVariable(id));
        }
        self.resolve(runtime, id);

        let children: Vec<u32> = self.variables[&id]
            .children
            .iter()
            .copied()
            .filter(|child| match args.filter {
                Some(VariablesFilter::Indexed) => self.variables[child].key.is_indexed(),
                Some(VariablesFilter::Named) => !self.variables[child].key.is_indexed(),
                None => true,
            })
            .skip(args.start.map_or(0, |start| start as usize))
            .take(match args.count {
                Some(count) if count > 0 => count as usize,
                _ => usize::MAX,
            })
            .collect();

        let mut variables = Vec::with_capacity(children.len());
        for child in children {
            variables.push(self.resolve(runtime, child));
        }
        Ok(variables)
    }

    /// Resolves `id` once and returns its protocol record.
    fn resolve(&mut self, runtime: &mut dyn DebugRuntime, id: u32) -> Variable {
        if let Some(resolved) = &self.variables[&id].resolved {
            return resolved.clone();
        }

        let name = self.variables[&id].key.display_name();
        let mut variable = Variable {
            name,
            value: String::new(),
            r#type: None,
            presentation_hint: property_hint(),
            variables_reference: 0,
            named_variables: None,
            indexed_variables: None,
        };

        let resolved = self
            .value_path(id)
            .and_then(|path| runtime.resolve(&path).map(|value| (path, value)));
        match resolved {
            None => variable.value = UNEVALUATED.to_string(),
            Some((path, RuntimeValue::Table)) => {
                let keys = runtime.entries(&path).unwrap_or_default();
                let is_array = keys.iter().all(|key| matches!(key, ValueKey::Index(_)));
                let mut children = Vec::with_capacity(keys.len());
                let (mut named, mut indexed) = (0usize, 0usize);
                for key in keys {
                    let key = match key {
                        ValueKey::Name(name) => {
                            named += 1;
                            VariableKey::Field(name)
                        }
                        ValueKey::Index(index) => {
                            indexed += 1;
                            VariableKey::Index(index)
                        }
                    };
                    let child = self.ids.next();
                    self.variables
                        .insert(child, VariableEntry::new(key, Parent::Variable(id)));
                    children.push(child);
                }
                variable.r#type = Some(if is_array { "array" } else { "object" }.to_string());
                if !children.is_empty() {
                    variable.variables_reference = id;
                    variable.named_variables = (named > 0).then(|| count(named));
                    variable.indexed_variables = (indexed > 0).then(|| count(indexed));
                }
                if let Some(entry) = self.variables.get_mut(&id) {
                    entry.children = children;
                }
            }
            Some((_, value)) => {
                let (value, type_name) = describe_scalar(&value);
                variable.value = value;
                variable.r#type = type_name.map(str::to_string);
            }
        }

        if let Some(entry) = self.variables.get_mut(&id) {
            entry.resolved = Some(variable.clone());
        }
        variable
    }

    /// Interpreter path of `id`: the owning frame level and local slot, then the
    /// table keys from the local down to `id`.
    fn value_path(&self, id: u32) -> Option<ValuePath> {
        let mut keys = Vec::new();
        let mut current = id;
        loop {
            let entry = self.variables.get(&current)?;
            match &entry.key {
                VariableKey::Root => return None,
                VariableKey::Field(name) => keys.push(ValueKey::Name(name.clone())),
                VariableKey::Index(index) => keys.push(ValueKey::Index(*index)),
                VariableKey::Local { slot, .. } => {
                    let Parent::Variable(root) = entry.parent else {
                        return None;
                    };
                    let Parent::Frame(frame_id) = self.variables.get(&root)?.parent else {
                        return None;
                    };
                    keys.reverse();
                    return Some(ValuePath {
                        level: self.frame_level(frame_id)?,
                        slot: *slot,
                        keys,
                    });
                }
            }
            let Parent::Variable(parent) = entry.parent else {
                return None;
            };
            current = parent;
        }
    }
}
