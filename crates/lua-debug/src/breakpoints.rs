//! Breakpoint registry shared by the session task and the interpreter thread.

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::config::PathCase;
use crate::protocol::{Breakpoint, FunctionBreakpoint, Source, SourceBreakpoint};

#[derive(Debug, Clone)]
struct RegisteredSourceBreakpoint {
    id: u32,
    source_id: u32,
    spec: SourceBreakpoint,
}

#[derive(Debug, Clone)]
struct RegisteredFunctionBreakpoint {
    id: u32,
    spec: FunctionBreakpoint,
}

#[derive(Debug, Default)]
struct RegistryState {
    sources: IndexMap<u32, Source>,
    source_breakpoints: Vec<RegisteredSourceBreakpoint>,
    function_breakpoints: Vec<RegisteredFunctionBreakpoint>,
    next_breakpoint_id: u32,
}

impl RegistryState {
    fn next_breakpoint_id(&mut self) -> u32 {
        self.next_breakpoint_id += 1;
        self.next_breakpoint_id
    }

    fn find_source(&self, path: Option<&str>, ignore_case: bool) -> Option<u32> {
        self.sources
            .iter()
            .find(|(_, source)| same_path(source.path.as_deref(), path, ignore_case))
            .map(|(id, _)| *id)
    }

    fn intern_source(&mut self, source: &Source, ignore_case: bool) -> u32 {
        if let Some(id) = self.find_source(source.path.as_deref(), ignore_case) {
            return id;
        }
        let id = u32::try_from(self.sources.len()).map_or(u32::MAX, |len| len + 1);
        self.sources.insert(id, source.clone());
        id
    }
}

/// Normalizes a client path or interpreter chunk name for comparison.
fn normalize(path: &str) -> String {
    let path = path.strip_prefix('@').unwrap_or(path);
    let path = path.replace('\\', "/");
    path.strip_prefix("./").map_or(path.clone(), str::to_string)
}

/// Source equality: absent and empty paths are equal to each other only.
fn same_path(left: Option<&str>, right: Option<&str>, ignore_case: bool) -> bool {
    let left = left.map(normalize).unwrap_or_default();
    let right = right.map(normalize).unwrap_or_default();
    match (left.is_empty(), right.is_empty()) {
        (true, true) => true,
        (false, false) if ignore_case => left.eq_ignore_ascii_case(&right),
        (false, false) => left == right,
        _ => false,
    }
}

/// Source and function breakpoints. All operations go through one lock.
#[derive(Debug)]
pub struct BreakpointRegistry {
    ignore_case: bool,
    state: Mutex<RegistryState>,
}

impl BreakpointRegistry {
    #[must_use]
    pub fn new(path_case: PathCase) -> Self {
        Self {
            ignore_case: path_case.ignores_case(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Replaces every breakpoint of `source` with `specs`.
    pub fn set_source_breakpoints(
        &self,
        source: &Source,
        specs: &[SourceBreakpoint],
    ) -> Vec<Breakpoint> {
        let mut state = self.state.lock();
        let source_id = state.intern_source(source, self.ignore_case);
        state
            .source_breakpoints
            .retain(|registered| registered.source_id != source_id);

        let mut breakpoints = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = state.next_breakpoint_id();
            state.source_breakpoints.push(RegisteredSourceBreakpoint {
                id,
                source_id,
                spec: spec.clone(),
            });
            breakpoints.push(Breakpoint {
                id,
                verified: true,
                source: Some(source.clone()),
                line: Some(spec.line),
            });
        }
        tracing::debug!(source_id, count = breakpoints.len(), "source breakpoints replaced");
        breakpoints
    }

    /// Replaces the whole function breakpoint set.
    pub fn set_function_breakpoints(&self, specs: &[FunctionBreakpoint]) -> Vec<Breakpoint> {
        let mut state = self.state.lock();
        state.function_breakpoints.clear();

        let mut breakpoints = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = state.next_breakpoint_id();
            state.function_breakpoints.push(RegisteredFunctionBreakpoint {
                id,
                spec: spec.clone(),
            });
            breakpoints.push(Breakpoint {
                id,
                verified: true,
                source: None,
                line: None,
            });
        }
        breakpoints
    }

    /// First source breakpoint registered for `source` at `line`.
    pub fn match_line(&self, source: Option<&str>, line: u32) -> Option<u32> {
        let state = self.state.lock();
        let source_id = state.find_source(source, self.ignore_case)?;
        state
            .source_breakpoints
            .iter()
            .find(|registered| registered.source_id == source_id && registered.spec.line == line)
            .map(|registered| registered.id)
    }

    /// First function breakpoint named `function`.
    pub fn match_call(&self, function: &str) -> Option<u32> {
        let state = self.state.lock();
        state
            .function_breakpoints
            .iter()
            .find(|registered| registered.spec.name == function)
            .map(|registered| registered.id)
    }

    /// Registered source id for `source`, if it was seen before.
    pub fn source_id(&self, source: &Source) -> Option<u32> {
        self.state
            .lock()
            .find_source(source.path.as_deref(), self.ignore_case)
    }

    pub fn source(&self, source_id: u32) -> Option<Source> {
        self.state.lock().sources.get(&source_id).cloned()
    }

    /// Line breakpoints currently registered for `source`, in registration order.
    pub fn source_breakpoint_lines(&self, source: &Source) -> Vec<u32> {
        let state = self.state.lock();
        let Some(source_id) = state.find_source(source.path.as_deref(), self.ignore_case) else {
            return Vec::new();
        };
        state
            .source_breakpoints
            .iter()
            .filter(|registered| registered.source_id == source_id)
            .map(|registered| registered.spec.line)
            .collect()
    }
}
