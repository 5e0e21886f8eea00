//! Lazy stack/scope/variable graph for one stop.
//! - ReferenceIds: reference id allocator shared across stops
//! - StackGraph::stack_trace: frames, enumerated once per stop
//! - StackGraph::scopes: single `Locals` scope per frame
//! - StackGraph::variables (variables.rs): lazy value resolution by path
//! - format: scalar display strings

mod format;
mod variables;

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{DebugError, Result};
use crate::protocol::{Scope, Source, StackFrame, StackTraceArguments, StackTraceResponseBody};
use crate::runtime::{DebugRuntime, FrameInfo, FrameKind};

use self::variables::VariableEntry;

/// Allocator for frame and variable reference ids. One allocator serves every
/// stop of a session, so ids from an ended stop are never minted again.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIds(Arc<AtomicU32>);

impl ReferenceIds {
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug)]
struct FrameEntry {
    level: u32,
    frame: StackFrame,
    locals_root: Option<u32>,
}

/// Frames and variables of the current stop. Owned by the interpreter thread and
/// dropped when the stop ends.
#[derive(Debug)]
pub struct StackGraph {
    ids: ReferenceIds,
    frames: Option<IndexMap<u32, FrameEntry>>,
    variables: IndexMap<u32, VariableEntry>,
}

impl StackGraph {
    #[must_use]
    pub fn new(ids: ReferenceIds) -> Self {
        Self {
            ids,
            frames: None,
            variables: IndexMap::new(),
        }
    }

    fn ensure_frames(&mut self, runtime: &mut dyn DebugRuntime) -> &mut IndexMap<u32, FrameEntry> {
        let ids = &self.ids;
        self.frames.get_or_insert_with(|| {
            let mut frames = IndexMap::new();
            let mut level = 0;
            while let Some(info) = runtime.frame(level) {
                let id = ids.next();
                frames.insert(
                    id,
                    FrameEntry {
                        level,
                        frame: stack_frame(id, &info),
                        locals_root: None,
                    },
                );
                level += 1;
            }
            tracing::debug!(frames = frames.len(), "stack enumerated");
            frames
        })
    }

    pub fn stack_trace(
        &mut self,
        runtime: &mut dyn DebugRuntime,
        args: &StackTraceArguments,
    ) -> StackTraceResponseBody {
        let frames = self.ensure_frames(runtime);
        let total = frames.len();
        let start = args.start_frame.map_or(0, |start| start as usize).min(total);
        let levels = match args.levels {
            Some(levels) if levels > 0 => levels as usize,
            _ => total,
        };
        let stack_frames = frames
            .values()
            .skip(start)
            .take(levels)
            .map(|entry| entry.frame.clone())
            .collect();
        StackTraceResponseBody {
            stack_frames,
            total_frames: Some(u32::try_from(total).unwrap_or(u32::MAX)),
        }
    }

    pub fn scopes(&mut self, runtime: &mut dyn DebugRuntime, frame_id: u32) -> Result<Vec<Scope>> {
        let (level, locals_root) = self
            .frames
            .as_ref()
            .and_then(|frames| frames.get(&frame_id))
            .map(|entry| (entry.level, entry.locals_root))
            .ok_or(DebugError::UnknownFrame(frame_id))?;
        let root = match locals_root {
            Some(root) => root,
            None => {
                let Some(names) = runtime.locals(level) else {
                    tracing::warn!(frame_id, level, "frame could not be activated");
                    return Ok(Vec::new());
                };
                let root = self.insert_locals(frame_id, names);
                if let Some(entry) = self
                    .frames
                    .as_mut()
                    .and_then(|frames| frames.get_mut(&frame_id))
                {
                    entry.locals_root = Some(root);
                }
                root
            }
        };
        Ok(vec![Scope {
            name: "Locals".to_string(),
            presentation_hint: Some("locals".to_string()),
            variables_reference: root,
            expensive: false,
        }])
    }

    fn frame_level(&self, frame_id: u32) -> Option<u32> {
        self.frames
            .as_ref()
            .and_then(|frames| frames.get(&frame_id))
            .map(|entry| entry.level)
    }
}

fn frame_name(info: &FrameInfo) -> String {
    match info.kind {
        FrameKind::Main => "Global".to_string(),
        FrameKind::Lua => info
            .name
            .as_ref()
            .map_or_else(|| "GLOBAL_SCOPE".to_string(), ToString::to_string),
        FrameKind::Native => "CFunc".to_string(),
    }
}

/// Maps a chunk name to a client source: `@path` names a file, anything else is
/// only a label.
fn frame_source(chunk: &str) -> Source {
    if let Some(path) = chunk.strip_prefix('@') {
        let name = Path::new(path)
            .file_name()
            .map_or_else(|| path.to_string(), |name| name.to_string_lossy().into_owned());
        return Source {
            name: Some(name),
            path: Some(path.to_string()),
        };
    }
    let label = chunk.strip_prefix('=').unwrap_or(chunk);
    Source {
        name: Some(label.lines().next().unwrap_or_default().to_string()),
        path: None,
    }
}

fn stack_frame(id: u32, info: &FrameInfo) -> StackFrame {
    StackFrame {
        id,
        name: frame_name(info),
        source: info.source.as_deref().map(frame_source),
        line: info.line.unwrap_or(0),
        column: 1,
    }
}
