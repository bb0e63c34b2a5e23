#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;

use ember_engine::error::{EngineError, Result};
use ember_engine::input::{EventSource, InputEvent};
use ember_engine::renderer::{Rect, RenderBackend, TextureDesc, TextureHandle};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Open,
    Close,
    CreateTexture,
    Clear,
    Blit,
    Present,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open { width: u32, height: u32 },
    Close,
    CreateTexture { width: u32, height: u32 },
    Clear,
    Blit { texture: TextureHandle, src: Rect, dst: Rect },
    Present,
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::Open { .. } => Op::Open,
            Call::Close => Op::Close,
            Call::CreateTexture { .. } => Op::CreateTexture,
            Call::Clear => Op::Clear,
            Call::Blit { .. } => Op::Blit,
            Call::Present => Op::Present,
        }
    }
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

pub fn count(log: &CallLog, op: Op) -> usize {
    log.borrow().iter().filter(|call| call.op() == op).count()
}

/// Backend that records every call and can fail the nth call of one kind.
pub struct RecordingBackend {
    log: CallLog,
    fail_on: Option<(Op, usize)>,
    textures: u32,
}

impl RecordingBackend {
    pub fn new() -> (Self, CallLog) {
        let log = CallLog::default();
        (Self { log: log.clone(), fail_on: None, textures: 0 }, log)
    }

    /// Fails the `nth` (1-based) call of `op` with a backend failure.
    pub fn failing(op: Op, nth: usize) -> (Self, CallLog) {
        let (mut backend, log) = Self::new();
        backend.fail_on = Some((op, nth));
        (backend, log)
    }

    fn record(&mut self, call: Call) -> Result<()> {
        let op = call.op();
        self.log.borrow_mut().push(call);
        match self.fail_on {
            Some((fail_op, nth)) if fail_op == op && count(&self.log, op) == nth => {
                Err(EngineError::BackendFailure(format!("injected {op:?} failure")))
            }
            _ => Ok(()),
        }
    }
}

impl RenderBackend for RecordingBackend {
    fn open(&mut self, width: u32, height: u32) -> Result<()> {
        self.record(Call::Open { width, height })
    }

    fn close(&mut self) {
        self.log.borrow_mut().push(Call::Close);
    }

    fn create_texture(&mut self, desc: &TextureDesc, _bytes: &[u8]) -> Result<TextureHandle> {
        self.record(Call::CreateTexture { width: desc.width, height: desc.height })?;
        self.textures += 1;
        Ok(TextureHandle::from_raw(self.textures - 1))
    }

    fn clear(&mut self) -> Result<()> {
        self.record(Call::Clear)
    }

    fn blit(&mut self, texture: TextureHandle, src: Rect, dst: Rect) -> Result<()> {
        self.record(Call::Blit { texture, src, dst })
    }

    fn present(&mut self) -> Result<()> {
        self.record(Call::Present)
    }
}

/// Event source replaying one batch of events per pump, then `Quit` forever.
#[derive(Default)]
pub struct ScriptedEvents {
    batches: VecDeque<Vec<InputEvent>>,
}

impl ScriptedEvents {
    pub fn new(batches: Vec<Vec<InputEvent>>) -> Self {
        Self { batches: batches.into() }
    }

    /// `frames` empty batches, then quit.
    pub fn frames(frames: usize) -> Self {
        Self::new(vec![Vec::new(); frames])
    }
}

impl EventSource for ScriptedEvents {
    fn pump(&mut self, out: &mut Vec<InputEvent>) -> Result<()> {
        match self.batches.pop_front() {
            Some(batch) => out.extend(batch),
            None => out.push(InputEvent::Quit),
        }
        Ok(())
    }
}

pub fn write_script(contents: &str) -> NamedTempFile {
    let mut temp = NamedTempFile::new().expect("temp script");
    write!(temp, "{contents}").expect("write script");
    temp
}
