use crate::language::symbols::DeclId;
use crate::runtime::value::{ObjectRef, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Global,
    Call,
    Block,
}

#[derive(Clone, Debug)]
struct Frame {
    kind: FrameKind,
    bindings: Vec<(DeclId, Value)>,
    this: Option<ObjectRef>,
}

impl Frame {
    fn new(kind: FrameKind, this: Option<ObjectRef>) -> Self {
        Self {
            kind,
            bindings: Vec::new(),
            this,
        }
    }

    fn slot(&mut self, decl: DeclId) -> Option<&mut Value> {
        self.bindings
            .iter_mut()
            .rev()
            .find(|(id, _)| *id == decl)
            .map(|(_, value)| value)
    }
}

/// Frame stack. Lookups see the frames of the current call and then the
/// global frame; the caller's locals stay hidden.
#[derive(Clone, Debug)]
pub struct Environment {
    frames: Vec<Frame>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(FrameKind::Global, None)],
        }
    }

    pub fn push_block(&mut self) {
        self.frames.push(Frame::new(FrameKind::Block, None));
    }

    pub fn push_call(&mut self, this: Option<ObjectRef>) {
        self.frames.push(Frame::new(FrameKind::Call, this));
    }

    /// The global frame is never popped.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn unwind_to_global(&mut self) {
        self.frames.truncate(1);
    }

    pub fn bind(&mut self, decl: DeclId, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.bindings.push((decl, value));
        }
    }

    pub fn get(&self, decl: DeclId) -> Option<Value> {
        self.visible()
            .find_map(|frame| {
                frame
                    .bindings
                    .iter()
                    .rev()
                    .find(|(id, _)| *id == decl)
                    .map(|(_, value)| value.clone())
            })
    }

    pub fn assign(&mut self, decl: DeclId, value: Value) -> bool {
        let boundary = self.call_boundary();
        let (global, rest) = self.frames.split_at_mut(1);
        for frame in rest[boundary.saturating_sub(1)..].iter_mut().rev() {
            if let Some(slot) = frame.slot(decl) {
                *slot = value;
                return true;
            }
        }
        match global[0].slot(decl) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Receiver of the innermost call.
    pub fn this(&self) -> Option<ObjectRef> {
        self.frames
            .iter()
            .rev()
            .find(|frame| frame.kind != FrameKind::Block)
            .and_then(|frame| frame.this.clone())
    }

    /// Index of the innermost call frame, or 0 when only blocks sit on top
    /// of the global frame.
    fn call_boundary(&self) -> usize {
        self.frames
            .iter()
            .rposition(|frame| frame.kind == FrameKind::Call)
            .unwrap_or(0)
    }

    fn visible(&self) -> impl Iterator<Item = &Frame> {
        let boundary = self.call_boundary();
        let local = self.frames[boundary.max(1)..].iter().rev();
        local.chain(self.frames.first())
    }
}
