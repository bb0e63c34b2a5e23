//! Fixed-capacity slab of render nodes.
//!
//! Slots are allocated once and never grow. Free slot indices live in a
//! min-heap, so `add` always takes the lowest free index and both `add` and
//! `remove` are O(log n). Since slots draw in index order, a new node lands in
//! the first gap. Each slot carries a generation counter so a handle to a
//! removed node is rejected even after its slot has been reused.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};

use super::RenderBackend;
use crate::error::{EngineError, Result};
use crate::sprite::Sprite;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Stable reference to an occupied slot of one specific pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pool: u32,
    index: u32,
    generation: u32,
}

impl NodeHandle {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Contents of one slot. Sprites are held weakly: the script or game code that
/// created a sprite owns it, and a node whose sprite is gone draws nothing.
#[derive(Debug, Default)]
pub enum RenderNode {
    #[default]
    Empty,
    Sprite(Weak<RefCell<Sprite>>),
}

#[derive(Debug, Default)]
struct Slot {
    node: RenderNode,
    generation: u32,
}

#[derive(Debug)]
pub struct RenderPool {
    id: u32,
    slots: Vec<Slot>,
    free: BinaryHeap<Reverse<u32>>,
}

impl RenderPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            slots,
            free: (0..capacity as u32).map(Reverse).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, sprite: &Rc<RefCell<Sprite>>) -> Result<NodeHandle> {
        let Reverse(index) = self.free.pop().ok_or(EngineError::RenderQueueFull { capacity: self.slots.len() })?;
        let slot = &mut self.slots[index as usize];
        slot.node = RenderNode::Sprite(Rc::downgrade(sprite));
        Ok(NodeHandle { pool: self.id, index, generation: slot.generation })
    }

    pub fn remove(&mut self, handle: NodeHandle) -> Result<()> {
        if !self.contains(handle) {
            return Err(EngineError::RenderBadNode);
        }
        let slot = &mut self.slots[handle.index()];
        slot.node = RenderNode::Empty;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(Reverse(handle.index));
        Ok(())
    }

    /// True when `handle` was issued by this pool and its node is still present.
    pub fn contains(&self, handle: NodeHandle) -> bool {
        if handle.pool != self.id {
            return false;
        }
        match self.slots.get(handle.index()) {
            Some(slot) => slot.generation == handle.generation && !matches!(slot.node, RenderNode::Empty),
            None => false,
        }
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&RenderNode> {
        if self.contains(handle) {
            Some(&self.slots[handle.index()].node)
        } else {
            None
        }
    }

    /// Occupied slots in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &RenderNode)> + '_ {
        self.slots.iter().enumerate().filter(|(_, slot)| !matches!(slot.node, RenderNode::Empty)).map(
            move |(index, slot)| {
                (NodeHandle { pool: self.id, index: index as u32, generation: slot.generation }, &slot.node)
            },
        )
    }

    /// Empties every slot. Outstanding handles become invalid.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            if !matches!(slot.node, RenderNode::Empty) {
                slot.node = RenderNode::Empty;
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len() as u32).map(Reverse).collect();
    }

    pub fn clear<B: RenderBackend + ?Sized>(&self, backend: &mut B) -> Result<()> {
        backend.clear()
    }

    /// Blits every live node in slot order. Stops at the first failure.
    pub fn draw_all<B: RenderBackend + ?Sized>(&self, backend: &mut B) -> Result<usize> {
        let mut drawn = 0;
        for (_, node) in self.iter() {
            let RenderNode::Sprite(weak) = node else { continue };
            let Some(sprite) = weak.upgrade() else { continue };
            let sprite = sprite.borrow();
            let (src, dst) = sprite.blit_rects()?;
            let texture = sprite.sheet().texture().handle(backend)?;
            backend.blit(texture, src, dst)?;
            drawn += 1;
        }
        Ok(drawn)
    }

    /// Draws all nodes and presents the frame.
    pub fn present<B: RenderBackend + ?Sized>(&self, backend: &mut B) -> Result<usize> {
        let drawn = self.draw_all(backend)?;
        backend.present()?;
        Ok(drawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::renderer::{Rect, Texture};
    use crate::sprite::SpriteSheet;

    fn sprite() -> Rc<RefCell<Sprite>> {
        let texture = Rc::new(Texture::solid(8, 8, [255; 4]).expect("texture"));
        Sprite::shared(Rc::new(SpriteSheet::new(texture, vec![Rect::new(0, 0, 8, 8)])))
    }

    #[test]
    fn sequential_adds_fill_ascending_slots() {
        let mut pool = RenderPool::new(4);
        let sprites: Vec<_> = (0..4).map(|_| sprite()).collect();
        let handles: Vec<_> = sprites.iter().map(|s| pool.add(s).expect("add")).collect();
        assert_eq!(handles.iter().map(|h| h.index()).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(pool.len(), 4);
        let visited: Vec<_> = pool.iter().map(|(h, _)| h.index()).collect();
        assert_eq!(visited, vec![0, 1, 2, 3]);
    }

    #[test]
    fn full_pool_rejects_add_without_changes() {
        let mut pool = RenderPool::new(2);
        let a = sprite();
        let b = sprite();
        let c = sprite();
        let ha = pool.add(&a).expect("add a");
        let hb = pool.add(&b).expect("add b");
        let err = pool.add(&c).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RenderQueueFull);
        assert_eq!(pool.len(), 2);
        assert!(pool.contains(ha) && pool.contains(hb));
    }

    #[test]
    fn removed_slot_is_reused_and_old_handle_goes_stale() {
        let mut pool = RenderPool::new(3);
        let sprites: Vec<_> = (0..3).map(|_| sprite()).collect();
        let handles: Vec<_> = sprites.iter().map(|s| pool.add(s).expect("add")).collect();
        pool.remove(handles[1]).expect("remove");
        let again = pool.add(&sprites[1]).expect("re-add");
        assert_eq!(again.index(), 1);
        assert_ne!(again, handles[1]);
        assert_eq!(pool.remove(handles[1]).unwrap_err(), EngineError::RenderBadNode);
        assert!(pool.contains(again));
    }

    #[test]
    fn add_takes_the_lowest_free_slot() {
        let mut pool = RenderPool::new(4);
        let sprites: Vec<_> = (0..4).map(|_| sprite()).collect();
        let handles: Vec<_> = sprites.iter().map(|s| pool.add(s).expect("add")).collect();
        pool.remove(handles[1]).expect("remove 1");
        pool.remove(handles[3]).expect("remove 3");
        assert_eq!(pool.add(&sprites[3]).expect("add").index(), 1);
        assert_eq!(pool.add(&sprites[1]).expect("add").index(), 3);
        let visited: Vec<_> = pool.iter().map(|(h, _)| h.index()).collect();
        assert_eq!(visited, vec![0, 1, 2, 3]);
    }

    #[test]
    fn remove_rejects_empty_and_foreign_handles() {
        let mut pool = RenderPool::new(2);
        let mut other = RenderPool::new(2);
        let s = sprite();
        let handle = pool.add(&s).expect("add");
        pool.remove(handle).expect("first remove");
        assert_eq!(pool.remove(handle).unwrap_err().code(), ErrorCode::RenderBadNode);

        let foreign = other.add(&s).expect("foreign add");
        let kept = pool.add(&s).expect("add");
        assert_eq!(pool.remove(foreign).unwrap_err().code(), ErrorCode::RenderBadNode);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(kept));
        assert!(other.contains(foreign));
    }

    #[test]
    fn reset_invalidates_handles() {
        let mut pool = RenderPool::new(2);
        let s = sprite();
        let handle = pool.add(&s).expect("add");
        pool.reset();
        assert!(pool.is_empty());
        assert!(!pool.contains(handle));
        assert_eq!(pool.add(&s).expect("add after reset").index(), 0);
    }

    #[test]
    fn zero_capacity_pool_is_always_full() {
        let mut pool = RenderPool::new(0);
        assert_eq!(pool.add(&sprite()).unwrap_err(), EngineError::RenderQueueFull { capacity: 0 });
    }
}
