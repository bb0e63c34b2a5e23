//! Functions and types scripts use to build textures, sheets and sprites, read
//! key state and log.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use glam::Vec2;
use rand::Rng;
use rhai::{Array, Engine, EvalAltResult, FLOAT, INT};

use crate::input::{InputState, KeyCode};
use crate::renderer::{NodeHandle, Rect, RenderPool, Texture};
use crate::sprite::{SharedSprite, Sprite, SpriteSheet};

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Engine state the script API reaches into.
#[derive(Clone)]
pub struct ScriptBindings {
    pub pool: Rc<RefCell<RenderPool>>,
    pub input: Rc<RefCell<InputState>>,
}

#[derive(Clone)]
pub struct ScriptTexture(Rc<Texture>);

impl ScriptTexture {
    pub fn texture(&self) -> &Rc<Texture> {
        &self.0
    }
}

#[derive(Clone)]
pub struct ScriptSheet(Rc<SpriteSheet>);

/// Script-side sprite. Clones share the sprite and its render node; once the
/// last clone is dropped the node is removed from the pool.
#[derive(Clone)]
pub struct ScriptSprite {
    sprite: SharedSprite,
    node: Rc<NodeSlot>,
}

struct NodeSlot {
    pool: Weak<RefCell<RenderPool>>,
    handle: Cell<Option<NodeHandle>>,
}

impl Drop for NodeSlot {
    fn drop(&mut self) {
        let (Some(handle), Some(pool)) = (self.handle.take(), self.pool.upgrade()) else { return };
        match pool.try_borrow_mut() {
            Ok(mut pool) => {
                if let Err(err) = pool.remove(handle) {
                    log::debug!(target: "ember::script", "node {} already gone: {err}", handle.index());
                }
            }
            Err(_) => log::warn!(target: "ember::script", "render pool busy; node {} left behind", handle.index()),
        };
    }
}

impl ScriptSprite {
    pub fn new(sheet: Rc<SpriteSheet>, pool: Weak<RefCell<RenderPool>>) -> Self {
        Self { sprite: Sprite::shared(sheet), node: Rc::new(NodeSlot { pool, handle: Cell::new(None) }) }
    }

    pub fn sprite(&self) -> &SharedSprite {
        &self.sprite
    }

    pub fn node(&self) -> Option<NodeHandle> {
        self.node.handle.get()
    }

    /// True while the sprite's node is live in its pool. A pool reset hides
    /// every sprite.
    pub fn visible(&self) -> bool {
        let (Some(handle), Some(pool)) = (self.node.handle.get(), self.node.pool.upgrade()) else { return false };
        let visible = pool.try_borrow().map(|pool| pool.contains(handle)).unwrap_or(true);
        visible
    }

    pub fn set_visible(&self, visible: bool) -> crate::error::Result<()> {
        let Some(pool) = self.node.pool.upgrade() else {
            self.node.handle.set(None);
            return if visible { Err(crate::error::EngineError::RenderBadNode) } else { Ok(()) };
        };
        let mut pool = pool.borrow_mut();
        let current = self.node.handle.get().filter(|handle| pool.contains(*handle));
        match (visible, current) {
            (true, None) => {
                let handle = pool.add(&self.sprite)?;
                self.node.handle.set(Some(handle));
            }
            (false, Some(handle)) => {
                self.node.handle.set(None);
                pool.remove(handle)?;
            }
            (false, None) => self.node.handle.set(None),
            (true, Some(_)) => {}
        }
        Ok(())
    }
}

fn frame_rect(value: rhai::Dynamic) -> ScriptResult<Rect> {
    let parts = value.into_typed_array::<INT>().map_err(|_| "a frame must be an array of four integers")?;
    let [x, y, w, h] = parts[..] else {
        return Err("a frame must be [x, y, width, height]".into());
    };
    if w < 0 || h < 0 {
        return Err(format!("frame size {w}x{h} is negative").into());
    }
    let narrow = |v: INT| i32::try_from(v).map_err(|_| format!("frame value {v} is out of range"));
    Ok(Rect::new(narrow(x)?, narrow(y)?, narrow(w)? as u32, narrow(h)? as u32))
}

fn channel(value: INT) -> ScriptResult<u8> {
    u8::try_from(value).map_err(|_| format!("color channel {value} is outside 0..=255").into())
}

pub(crate) fn register_api(engine: &mut Engine, bindings: &ScriptBindings) {
    engine.on_print(|text| log::info!(target: "ember::script", "{text}"));
    engine.on_debug(|text, source, pos| {
        log::debug!(target: "ember::script", "{}:{pos:?} {text}", source.unwrap_or("<script>"))
    });
    engine.register_fn("log", |message: &str| log::info!(target: "ember::script", "{message}"));
    engine.register_fn("rand", |min: FLOAT, max: FLOAT| -> FLOAT {
        if min < max {
            rand::thread_rng().gen_range(min..max)
        } else {
            min
        }
    });

    let input = bindings.input.clone();
    engine.register_fn("key_pressed", move |name: &str| -> ScriptResult<bool> {
        let code = KeyCode::from_name(name).ok_or_else(|| format!("unknown key '{name}'"))?;
        Ok(input.borrow().is_pressed(code))
    });

    engine.register_type_with_name::<ScriptTexture>("Texture");
    engine.register_fn("load_texture", |path: &str| -> ScriptResult<ScriptTexture> {
        Texture::load(path).map(|tex| ScriptTexture(Rc::new(tex))).map_err(|err| err.to_string().into())
    });
    engine.register_fn(
        "solid_texture",
        |w: INT, h: INT, r: INT, g: INT, b: INT, a: INT| -> ScriptResult<ScriptTexture> {
            let w = u32::try_from(w).map_err(|_| format!("invalid texture width {w}"))?;
            let h = u32::try_from(h).map_err(|_| format!("invalid texture height {h}"))?;
            let color = [channel(r)?, channel(g)?, channel(b)?, channel(a)?];
            Texture::solid(w, h, color).map(|tex| ScriptTexture(Rc::new(tex))).map_err(|err| err.to_string().into())
        },
    );
    engine.register_get("width", |tex: &mut ScriptTexture| tex.0.width() as INT);
    engine.register_get("height", |tex: &mut ScriptTexture| tex.0.height() as INT);

    engine.register_type_with_name::<ScriptSheet>("Sheet");
    engine.register_fn("sheet", |tex: ScriptTexture, frames: Array| -> ScriptResult<ScriptSheet> {
        let frames = frames.into_iter().map(frame_rect).collect::<ScriptResult<Vec<_>>>()?;
        Ok(ScriptSheet(Rc::new(SpriteSheet::new(tex.0, frames))))
    });
    engine.register_fn("len", |sheet: &mut ScriptSheet| sheet.0.frames().len() as INT);

    engine.register_type_with_name::<ScriptSprite>("Sprite");
    let pool = Rc::downgrade(&bindings.pool);
    engine.register_fn("sprite", move |sheet: ScriptSheet| ScriptSprite::new(sheet.0, pool.clone()));
    engine.register_get_set(
        "x",
        |s: &mut ScriptSprite| s.sprite.borrow().position.x as FLOAT,
        |s: &mut ScriptSprite, x: FLOAT| s.sprite.borrow_mut().position.x = x as f32,
    );
    engine.register_get_set(
        "y",
        |s: &mut ScriptSprite| s.sprite.borrow().position.y as FLOAT,
        |s: &mut ScriptSprite, y: FLOAT| s.sprite.borrow_mut().position.y = y as f32,
    );
    engine.register_fn("move_to", |s: &mut ScriptSprite, x: FLOAT, y: FLOAT| {
        s.sprite.borrow_mut().position = Vec2::new(x as f32, y as f32);
    });
    engine.register_get("frame", |s: &mut ScriptSprite| s.sprite.borrow().frame as INT);
    engine.register_set("frame", |s: &mut ScriptSprite, frame: INT| -> ScriptResult<()> {
        let frame = usize::try_from(frame).map_err(|_| format!("sprite frame {frame} is negative"))?;
        s.sprite.borrow_mut().frame = frame;
        Ok(())
    });
    engine.register_get("visible", |s: &mut ScriptSprite| s.visible());
    engine.register_set("visible", |s: &mut ScriptSprite, visible: bool| -> ScriptResult<()> {
        s.set_visible(visible).map_err(|err| err.to_string().into())
    });
}
