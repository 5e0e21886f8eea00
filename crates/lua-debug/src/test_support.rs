//! In-memory interpreter and scripted target for tests.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::sync::oneshot;

use crate::error::{DebugError, Result};
use crate::runtime::{
    DebugRuntime, DebugTarget, ExecutionEvent, ExecutionHook, FrameInfo, FrameKind, RuntimeValue,
    StartMode, ValueKey, ValuePath,
};

#[derive(Debug, Clone)]
pub enum FakeValue {
    Scalar(RuntimeValue),
    Table(Vec<(ValueKey, FakeValue)>),
}

impl FakeValue {
    pub fn number(value: f64) -> Self {
        Self::Scalar(RuntimeValue::Number(value))
    }

    pub fn string(value: &str) -> Self {
        Self::Scalar(RuntimeValue::String(value.to_string()))
    }

    pub fn array(items: Vec<FakeValue>) -> Self {
        Self::Table(
            items
                .into_iter()
                .zip(1..)
                .map(|(item, index)| (ValueKey::Index(index), item))
                .collect(),
        )
    }

    pub fn object(fields: Vec<(&str, FakeValue)>) -> Self {
        Self::Table(
            fields
                .into_iter()
                .map(|(name, value)| (ValueKey::Name(name.to_string()), value))
                .collect(),
        )
    }

    fn get(&self, key: &ValueKey) -> Option<&FakeValue> {
        match self {
            Self::Table(entries) => entries
                .iter()
                .find(|(entry_key, _)| entry_key == key)
                .map(|(_, value)| value),
            Self::Scalar(_) => None,
        }
    }

    fn to_runtime(&self) -> RuntimeValue {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Table(_) => RuntimeValue::Table,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeFrame {
    pub info: FrameInfo,
    pub locals: Vec<(String, FakeValue)>,
    pub active: bool,
}

impl FakeFrame {
    pub fn lua(name: Option<&str>, source: &str, line: u32) -> Self {
        Self {
            info: FrameInfo {
                kind: FrameKind::Lua,
                name: name.map(SmolStr::new),
                source: Some(source.to_string()),
                line: Some(line),
            },
            locals: Vec::new(),
            active: true,
        }
    }

    pub fn main(source: &str, line: u32) -> Self {
        let mut frame = Self::lua(None, source, line);
        frame.info.kind = FrameKind::Main;
        frame
    }

    pub fn native() -> Self {
        Self {
            info: FrameInfo {
                kind: FrameKind::Native,
                name: None,
                source: Some("=[C]".to_string()),
                line: None,
            },
            locals: Vec::new(),
            active: true,
        }
    }

    pub fn local(mut self, name: &str, value: FakeValue) -> Self {
        self.locals.push((name.to_string(), value));
        self
    }
}

/// Interpreter stack snapshot; `frames[0]` is the innermost frame.
#[derive(Debug, Clone, Default)]
pub struct FakeRuntime {
    pub frames: Vec<FakeFrame>,
}

impl FakeRuntime {
    pub fn new(frames: Vec<FakeFrame>) -> Self {
        Self { frames }
    }

    fn lookup(&self, path: &ValuePath) -> Option<&FakeValue> {
        let frame = self.frames.get(path.level as usize)?;
        if !frame.active {
            return None;
        }
        let slot = (path.slot as usize).checked_sub(1)?;
        let mut value = &frame.locals.get(slot)?.1;
        for key in &path.keys {
            value = value.get(key)?;
        }
        Some(value)
    }
}

impl DebugRuntime for FakeRuntime {
    fn frame(&mut self, level: u32) -> Option<FrameInfo> {
        self.frames.get(level as usize).map(|frame| frame.info.clone())
    }

    fn locals(&mut self, level: u32) -> Option<Vec<String>> {
        let frame = self.frames.get(level as usize)?;
        frame
            .active
            .then(|| frame.locals.iter().map(|(name, _)| name.clone()).collect())
    }

    fn resolve(&mut self, path: &ValuePath) -> Option<RuntimeValue> {
        self.lookup(path).map(FakeValue::to_runtime)
    }

    fn entries(&mut self, path: &ValuePath) -> Option<Vec<ValueKey>> {
        match self.lookup(path)? {
            FakeValue::Table(entries) => Some(entries.iter().map(|(key, _)| key.clone()).collect()),
            FakeValue::Scalar(_) => None,
        }
    }
}

/// One hook call: the stack as the interpreter sees it and the event.
pub type ScriptStep = (FakeRuntime, ExecutionEvent);

/// Target that replays a fixed list of events on its own thread.
pub struct ScriptedTarget {
    script: Mutex<Option<Vec<ScriptStep>>>,
    finished: Mutex<Option<oneshot::Sender<StartMode>>>,
    fail_start: bool,
}

impl ScriptedTarget {
    pub fn new(script: Vec<ScriptStep>) -> (Arc<Self>, oneshot::Receiver<StartMode>) {
        let (tx, rx) = oneshot::channel();
        let target = Arc::new(Self {
            script: Mutex::new(Some(script)),
            finished: Mutex::new(Some(tx)),
            fail_start: false,
        });
        (target, rx)
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(None),
            finished: Mutex::new(None),
            fail_start: true,
        })
    }
}

impl DebugTarget for ScriptedTarget {
    fn start(&self, mode: StartMode, hook: Arc<dyn ExecutionHook>) -> Result<()> {
        if self.fail_start {
            return Err(DebugError::Launch("script not found".into()));
        }
        let script = self
            .script
            .lock()
            .take()
            .ok_or_else(|| DebugError::Launch("already started".into()))?;
        let finished = self.finished.lock().take();
        thread::spawn(move || {
            for (mut runtime, event) in script {
                hook.on_execution_event(&mut runtime, &event);
            }
            if let Some(finished) = finished {
                let _ = finished.send(mode);
            }
        });
        Ok(())
    }
}
