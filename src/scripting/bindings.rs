//! Lua bindings: the scripting surface exposed to game scripts.
//!
//! Globals: `game`, `current_map`, `camera`, `player`, direction constants,
//! `Vec2`/`Vec3`/`Vec4`/`Color`/`Rect` constructors, `Canvas`, `Music`,
//! `Sound`, `text`, and `choices`. Engine state is reached through the
//! shared game cell in Lua app data; every async operation returns a wrapped
//! command handle that scripts `wait()` on.

use glam::Vec2;
use mlua::{
    Function, Lua, LuaSerdeExt, Table, UserData, UserDataFields, UserDataMethods, UserDataRef,
    Value,
};
use std::cell::RefCell;
use std::rc::Rc;

use crate::canvas::{Canvas, TextStyle};
use crate::commands::{
    CanvasUpdate, Command, LayerOpacityUpdate, MoveCamera, MoveObject, MoveObjectTo, MusicFade,
    PoseTarget, ShakeScreen, SharedCommand, ShowPose, ShowText, TextOptions, TextPosition,
    TintScreen, Wait,
};
use crate::game::Game;
use crate::map::collision::CollisionCheck;
use crate::map::object::ScriptContext;
use crate::map::ObjectId;
use crate::scripting::ScriptState;
use crate::sprite::Sprite;
use crate::util::color::Color as EngineColor;
use crate::util::direction::Direction;
use crate::util::rect::Rect;

// ==================== Helpers ====================

fn with_game<R>(lua: &Lua, f: impl FnOnce(&mut Game) -> mlua::Result<R>) -> mlua::Result<R> {
    let state = lua
        .app_data_ref::<ScriptState>()
        .ok_or_else(|| mlua::Error::runtime("script state missing"))?;
    let mut game = state
        .game
        .try_borrow_mut()
        .map_err(|_| mlua::Error::runtime("game state is busy"))?;
    f(&mut game)
}

fn current_context(lua: &Lua) -> ScriptContext {
    lua.app_data_ref::<ScriptState>()
        .map(|state| state.context.get())
        .unwrap_or(ScriptContext::Map)
}

/// Queue a command in the current script context and wrap it for Lua.
fn queue_command(lua: &Lua, command: Command) -> mlua::Result<Table> {
    let context = current_context(lua);
    let shared = with_game(lua, |game| Ok(game.enqueue_command(command, context)))?;
    wrap_command(lua, shared)
}

fn wrap_command(lua: &Lua, shared: SharedCommand) -> mlua::Result<Table> {
    let wrap: Function = lua.globals().get("__wrap_command")?;
    wrap.call(CommandHandle { command: shared })
}

fn direction_arg(value: &Value) -> mlua::Result<Direction> {
    match value {
        Value::Integer(bits) => Ok(Direction::from_bits_truncate(*bits as u32)),
        Value::Number(bits) => Ok(Direction::from_bits_truncate(*bits as u32)),
        Value::String(name) => Ok(Direction::parse(&name.to_string_lossy())),
        _ => Err(mlua::Error::runtime("expected a direction")),
    }
}

fn game_ticks(lua: &Lua) -> mlua::Result<i64> {
    with_game(lua, |game| Ok(game.ticks()))
}

// ==================== Value types ====================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec2Lua(pub Vec2);

impl UserData for Vec2Lua {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("x", |_, this| Ok(this.0.x));
        fields.add_field_method_set("x", |_, this, x: f32| {
            this.0.x = x;
            Ok(())
        });
        fields.add_field_method_get("y", |_, this| Ok(this.0.y));
        fields.add_field_method_set("y", |_, this, y: f32| {
            this.0.y = y;
            Ok(())
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("length", |_, this, ()| Ok(this.0.length()));
        methods.add_meta_method(
            mlua::MetaMethod::Add,
            |_, this, other: UserDataRef<Vec2Lua>| Ok(Vec2Lua(this.0 + other.0)),
        );
        methods.add_meta_method(
            mlua::MetaMethod::Sub,
            |_, this, other: UserDataRef<Vec2Lua>| Ok(Vec2Lua(this.0 - other.0)),
        );
        methods.add_meta_method(mlua::MetaMethod::Mul, |_, this, factor: f32| {
            Ok(Vec2Lua(this.0 * factor))
        });
        methods.add_meta_method(mlua::MetaMethod::ToString, |_, this, ()| {
            Ok(format!("Vec2({}, {})", this.0.x, this.0.y))
        });
        methods.add_meta_method(
            mlua::MetaMethod::Eq,
            |_, this, other: UserDataRef<Vec2Lua>| Ok(this.0 == other.0),
        );
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Vec3Lua(pub glam::Vec3);

impl UserData for Vec3Lua {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("x", |_, this| Ok(this.0.x));
        fields.add_field_method_get("y", |_, this| Ok(this.0.y));
        fields.add_field_method_get("z", |_, this| Ok(this.0.z));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Vec4Lua(pub glam::Vec4);

impl UserData for Vec4Lua {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("x", |_, this| Ok(this.0.x));
        fields.add_field_method_get("y", |_, this| Ok(this.0.y));
        fields.add_field_method_get("z", |_, this| Ok(this.0.z));
        fields.add_field_method_get("w", |_, this| Ok(this.0.w));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColorLua(pub EngineColor);

impl UserData for ColorLua {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("r", |_, this| Ok(this.0.r));
        fields.add_field_method_set("r", |_, this, r: f32| {
            this.0.r = r;
            Ok(())
        });
        fields.add_field_method_get("g", |_, this| Ok(this.0.g));
        fields.add_field_method_set("g", |_, this, g: f32| {
            this.0.g = g;
            Ok(())
        });
        fields.add_field_method_get("b", |_, this| Ok(this.0.b));
        fields.add_field_method_set("b", |_, this, b: f32| {
            this.0.b = b;
            Ok(())
        });
        fields.add_field_method_get("a", |_, this| Ok(this.0.a));
        fields.add_field_method_set("a", |_, this, a: f32| {
            this.0.a = a;
            Ok(())
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("hex", |_, this, ()| Ok(this.0.to_hex()));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RectLua(pub Rect);

impl UserData for RectLua {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("x", |_, this| Ok(this.0.x));
        fields.add_field_method_get("y", |_, this| Ok(this.0.y));
        fields.add_field_method_get("w", |_, this| Ok(this.0.w));
        fields.add_field_method_get("h", |_, this| Ok(this.0.h));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("intersects", |_, this, other: UserDataRef<RectLua>| {
            Ok(this.0.intersects(&other.0))
        });
    }
}

// ==================== Command handle ====================

pub struct CommandHandle {
    pub command: SharedCommand,
}

impl UserData for CommandHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("is_complete", |_, this, ()| {
            Ok(this.command.borrow().is_complete())
        });
        methods.add_method("stop", |_, this, ()| {
            this.command.borrow_mut().request_stop();
            Ok(())
        });
        methods.add_method("selected", |_, this, ()| {
            Ok(this.command.borrow().command.text_result())
        });
    }
}

// ==================== Object proxy ====================

#[derive(Debug, Clone, Copy)]
pub struct ObjectProxy {
    pub id: ObjectId,
}

impl ObjectProxy {
    fn read<R>(
        &self,
        lua: &Lua,
        f: impl FnOnce(&crate::map::MapObject) -> R,
    ) -> mlua::Result<Option<R>> {
        with_game(lua, |game| Ok(game.map.get_object(self.id).map(f)))
    }

    fn write(
        &self,
        lua: &Lua,
        f: impl FnOnce(&mut crate::map::MapObject, i64),
    ) -> mlua::Result<()> {
        with_game(lua, |game| {
            let ticks = game.ticks();
            if let Some(object) = game.map.get_object_mut(self.id) {
                f(object, ticks);
            }
            Ok(())
        })
    }
}

impl UserData for ObjectProxy {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("id", |_, this| Ok(this.id));
        fields.add_field_method_get("name", |lua, this| {
            this.read(lua, |object| object.name().to_string())
        });
        fields.add_field_method_set("name", |lua, this, name: String| {
            with_game(lua, |game| {
                game.map.rename_object(this.id, &name);
                Ok(())
            })
        });
        fields.add_field_method_get("type", |lua, this| {
            this.read(lua, |object| object.object_type.clone())
        });
        fields.add_field_method_get("x", |lua, this| this.read(lua, |object| object.position.x));
        fields.add_field_method_set("x", |lua, this, x: f32| {
            this.write(lua, |object, _| object.position.x = x)
        });
        fields.add_field_method_get("y", |lua, this| this.read(lua, |object| object.position.y));
        fields.add_field_method_set("y", |lua, this, y: f32| {
            this.write(lua, |object, _| object.position.y = y)
        });
        fields.add_field_method_get("position", |lua, this| {
            this.read(lua, |object| Vec2Lua(object.position))
        });
        fields.add_field_method_set("position", |lua, this, position: UserDataRef<Vec2Lua>| {
            let position = position.0;
            this.write(lua, move |object, _| object.position = position)
        });
        fields.add_field_method_get("visible", |lua, this| {
            this.read(lua, |object| object.is_visible())
        });
        fields.add_field_method_set("visible", |lua, this, visible: bool| {
            this.write(lua, move |object, ticks| object.set_visible(visible, ticks))
        });
        fields.add_field_method_get("disabled", |lua, this| {
            this.read(lua, |object| object.is_disabled())
        });
        fields.add_field_method_set("disabled", |lua, this, disabled: bool| {
            this.write(lua, move |object, ticks| object.set_disabled(disabled, ticks))
        });
        fields.add_field_method_get("stopped", |lua, this| {
            this.read(lua, |object| object.stopped)
        });
        fields.add_field_method_set("stopped", |lua, this, stopped: bool| {
            this.write(lua, move |object, _| object.stopped = stopped)
        });
        fields.add_field_method_get("frozen", |lua, this| {
            this.read(lua, |object| object.frozen)
        });
        fields.add_field_method_set("frozen", |lua, this, frozen: bool| {
            this.write(lua, move |object, _| object.frozen = frozen)
        });
        fields.add_field_method_get("passthrough", |lua, this| {
            this.read(lua, |object| object.passthrough)
        });
        fields.add_field_method_set("passthrough", |lua, this, passthrough: bool| {
            this.write(lua, move |object, _| object.passthrough = passthrough)
        });
        fields.add_field_method_get("speed", |lua, this| this.read(lua, |object| object.speed));
        fields.add_field_method_set("speed", |lua, this, speed: f32| {
            this.write(lua, move |object, _| object.speed = speed)
        });
        fields.add_field_method_get("opacity", |lua, this| {
            this.read(lua, |object| object.opacity)
        });
        fields.add_field_method_set("opacity", |lua, this, opacity: f32| {
            this.write(lua, move |object, _| object.opacity = opacity)
        });
        fields.add_field_method_get("direction", |lua, this| {
            this.read(lua, |object| object.direction.bits())
        });
        fields.add_field_method_set("direction", |lua, this, bits: u32| {
            this.write(lua, move |object, ticks| {
                object.face(Direction::from_bits_truncate(bits), ticks)
            })
        });
        fields.add_field_method_get("state", |lua, this| {
            this.read(lua, |object| object.state().to_string())
        });
        fields.add_field_method_set("state", |lua, this, state: String| {
            this.write(lua, move |object, ticks| object.update_state(&state, ticks))
        });
        fields.add_field_method_get("pose", |lua, this| {
            this.read(lua, |object| object.pose_name().to_string())
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // object:move(dir, pixels) -> command
        methods.add_method("move", |lua, this, (dir, pixels): (Value, f32)| {
            let dir = direction_arg(&dir)?;
            queue_command(
                lua,
                Command::MoveObject(MoveObject::new(this.id, dir, pixels, true, true)),
            )
        });

        // object:move_to(x, y [, keep_trying]) -> command
        methods.add_method(
            "move_to",
            |lua, this, (x, y, keep_trying): (f32, f32, Option<bool>)| {
                queue_command(
                    lua,
                    Command::MoveObjectTo(MoveObjectTo::new(
                        this.id,
                        Vec2::new(x, y),
                        CollisionCheck::BOTH,
                        keep_trying.unwrap_or(false),
                    )),
                )
            },
        );

        // object:face(dir) or object:face(x, y)
        methods.add_method("face", |lua, this, (a, b): (Value, Option<f32>)| {
            with_game(lua, |game| {
                let ticks = game.ticks();
                match b {
                    Some(y) => {
                        let x = match a {
                            Value::Integer(x) => x as f32,
                            Value::Number(x) => x as f32,
                            _ => return Err(mlua::Error::runtime("expected coordinates")),
                        };
                        if let Some(object) = game.map.get_object_mut(this.id) {
                            object.face_towards(Vec2::new(x, y), ticks);
                        }
                    }
                    None => {
                        let dir = direction_arg(&a)?;
                        if let Some(object) = game.map.get_object_mut(this.id) {
                            object.face(dir, ticks);
                        }
                    }
                }
                Ok(())
            })
        });

        // object:show_pose(pose [, state [, dir]]) -> command
        // The pose changes right away; the command just reports completion.
        methods.add_method(
            "show_pose",
            |lua, this, (pose, state, dir): (String, Option<String>, Option<Value>)| {
                let dir = match dir {
                    Some(value) => direction_arg(&value)?,
                    None => Direction::NONE,
                };
                let state = state.unwrap_or_default();
                with_game(lua, |game| {
                    let ticks = game.ticks();
                    if let Some(object) = game.map.get_object_mut(this.id) {
                        object.show_pose(&pose, &state, dir, ticks);
                    }
                    Ok(())
                })?;
                queue_command(
                    lua,
                    Command::ShowPose(
                        ShowPose::new(PoseTarget::Object(this.id), &pose, &state, dir).applied(),
                    ),
                )
            },
        );

        // object:run_script(source) - queued for the engine to start.
        methods.add_method("run_script", |lua, this, script: String| {
            with_game(lua, |game| {
                let context = game
                    .map
                    .get_object(this.id)
                    .map(|object| object.script_context)
                    .unwrap_or(ScriptContext::Map);
                game.pending_scripts.push((script, context));
                Ok(())
            })
        });

        // object:get_property(name) / object:set_property(name, value)
        methods.add_method("get_property", |lua, this, name: String| {
            this.read(lua, move |object| {
                object.properties.get(&name).map(str::to_string)
            })
            .map(Option::flatten)
        });
        methods.add_method("set_property", |lua, this, (name, value): (String, String)| {
            this.write(lua, move |object, _| object.properties.set(&name, value))
        });
    }
}

// ==================== Camera proxy ====================

struct CameraProxy;

impl UserData for CameraProxy {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("x", |lua, _| {
            with_game(lua, |game| Ok(game.camera.position().x))
        });
        fields.add_field_method_get("y", |lua, _| {
            with_game(lua, |game| Ok(game.camera.position().y))
        });
        fields.add_field_method_get("position", |lua, _| {
            with_game(lua, |game| Ok(Vec2Lua(game.camera.position())))
        });
        fields.add_field_method_get("tint_color", |lua, _| {
            with_game(lua, |game| Ok(ColorLua(game.camera.tint_color)))
        });
        fields.add_field_method_set("tint_color", |lua, _, color: UserDataRef<ColorLua>| {
            let color = color.0;
            with_game(lua, move |game| {
                game.camera.tint_color = color;
                Ok(())
            })
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // camera:move_to(x, y, speed) -> command
        methods.add_method("move_to", |lua, _, (x, y, speed): (f32, f32, f32)| {
            queue_command(
                lua,
                Command::MoveCamera(MoveCamera::new(Vec2::new(x, y), speed)),
            )
        });

        // camera:tint_screen(hex_or_color, duration) -> command
        methods.add_method(
            "tint_screen",
            |lua, _, (color, duration): (Value, i64)| {
                let color = color_arg(&color)?;
                let ticks = game_ticks(lua)?;
                queue_command(
                    lua,
                    Command::TintScreen(TintScreen::new(color, ticks, duration)),
                )
            },
        );

        // camera:shake_screen(strength, speed, duration) -> command
        methods.add_method(
            "shake_screen",
            |lua, _, (strength, speed, duration): (f32, f32, i64)| {
                let ticks = game_ticks(lua)?;
                queue_command(
                    lua,
                    Command::ShakeScreen(ShakeScreen::new(strength, speed, ticks, duration)),
                )
            },
        );

        // camera:track_object(object | nil)
        methods.add_method(
            "track_object",
            |lua, _, object: Option<UserDataRef<ObjectProxy>>| {
                with_game(lua, |game| {
                    game.camera.track_object(object.map(|proxy| proxy.id));
                    Ok(())
                })
            },
        );
    }
}

fn color_arg(value: &Value) -> mlua::Result<EngineColor> {
    match value {
        Value::String(hex) => EngineColor::from_hex(&hex.to_string_lossy())
            .ok_or_else(|| mlua::Error::runtime("invalid hex color")),
        Value::UserData(ud) => {
            let color = ud.borrow::<ColorLua>()?;
            Ok(color.0)
        }
        _ => Err(mlua::Error::runtime("expected a color")),
    }
}

// ==================== Map and layer proxies ====================

struct MapProxy;

impl UserData for MapProxy {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("width", |lua, _| with_game(lua, |game| Ok(game.map.width())));
        fields.add_field_method_get("height", |lua, _| {
            with_game(lua, |game| Ok(game.map.height()))
        });
        fields.add_field_method_get("tile_width", |lua, _| {
            with_game(lua, |game| Ok(game.map.tile_width()))
        });
        fields.add_field_method_get("tile_height", |lua, _| {
            with_game(lua, |game| Ok(game.map.tile_height()))
        });
        fields.add_field_method_get("filename", |lua, _| {
            with_game(lua, |game| Ok(game.map.filename.clone()))
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // current_map:get_object(name | id) -> object | nil
        methods.add_method("get_object", |lua, _, key: Value| {
            with_game(lua, |game| {
                let id = match &key {
                    Value::Integer(id) => {
                        let id = *id as ObjectId;
                        game.map.get_object(id).map(|_| id)
                    }
                    Value::String(name) => {
                        game.map.object_id_by_name(&name.to_string_lossy())
                    }
                    _ => None,
                };
                Ok(id.map(|id| ObjectProxy { id }))
            })
        });

        // current_map:delete_object(object)
        methods.add_method("delete_object", |lua, _, object: UserDataRef<ObjectProxy>| {
            let id = object.id;
            with_game(lua, move |game| {
                game.delete_object(id);
                Ok(())
            })
        });

        methods.add_method("get_property", |lua, _, name: String| {
            with_game(lua, |game| {
                Ok(game.map.properties.get(&name).map(str::to_string))
            })
        });
        methods.add_method("set_property", |lua, _, (name, value): (String, String)| {
            with_game(lua, move |game| {
                game.map.properties.set(&name, value);
                Ok(())
            })
        });

        // current_map:get_layer(name) -> layer | nil
        methods.add_method("get_layer", |lua, _, name: String| {
            with_game(lua, |game| {
                Ok(game.map.layer_index(&name).map(|index| LayerProxy { index }))
            })
        });

        methods.add_method("object_count", |lua, _, ()| {
            with_game(lua, |game| Ok(game.map.object_count()))
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct LayerProxy {
    index: usize,
}

impl UserData for LayerProxy {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("name", |lua, this| {
            let index = this.index;
            with_game(lua, move |game| {
                Ok(game.map.layers.get(index).map(|l| l.name.clone()))
            })
        });
        fields.add_field_method_get("opacity", |lua, this| {
            let index = this.index;
            with_game(lua, move |game| {
                Ok(game.map.layers.get(index).map(|l| l.opacity))
            })
        });
        fields.add_field_method_set("opacity", |lua, this, opacity: f32| {
            let index = this.index;
            with_game(lua, move |game| {
                if let Some(layer) = game.map.layers.get_mut(index) {
                    layer.set_opacity(opacity);
                }
                Ok(())
            })
        });
        fields.add_field_method_get("visible", |lua, this| {
            let index = this.index;
            with_game(lua, move |game| {
                Ok(game.map.layers.get(index).map(|l| l.visible))
            })
        });
        fields.add_field_method_set("visible", |lua, this, visible: bool| {
            let index = this.index;
            with_game(lua, move |game| {
                if let Some(layer) = game.map.layers.get_mut(index) {
                    layer.visible = visible;
                }
                Ok(())
            })
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // layer:update_opacity(target, duration) -> command
        methods.add_method(
            "update_opacity",
            |lua, this, (target, duration): (f32, i64)| {
                let ticks = game_ticks(lua)?;
                queue_command(
                    lua,
                    Command::LayerOpacityUpdate(LayerOpacityUpdate::new(
                        this.index, target, ticks, duration,
                    )),
                )
            },
        );
    }
}

// ==================== Game proxy ====================

struct GameProxy;

impl UserData for GameProxy {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("ticks", |lua, _| with_game(lua, |game| Ok(game.ticks())));
        fields.add_field_method_get("seconds", |lua, _| {
            with_game(lua, |game| Ok(game.seconds()))
        });
        fields.add_field_method_get("paused", |lua, _| {
            with_game(lua, |game| Ok(game.is_paused()))
        });
        fields.add_field_method_get("time_stopped", |lua, _| {
            with_game(lua, |game| Ok(game.clock.stopped()))
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // game:load_map(filename, x, y, dir)
        methods.add_method(
            "load_map",
            |lua, _, (filename, x, y, dir): (String, f32, f32, Option<Value>)| {
                let direction = match dir {
                    Some(value) => direction_arg(&value)?,
                    None => Direction::NONE,
                };
                with_game(lua, move |game| {
                    game.request_map(&filename, Vec2::new(x, y), direction);
                    Ok(())
                })
            },
        );

        // game:wait(ms) -> command; the prelude's wait() is the usual way.
        methods.add_method("wait", |lua, _, duration: i64| {
            let ticks = game_ticks(lua)?;
            queue_command(lua, Command::Wait(Wait::new(ticks, duration)))
        });

        methods.add_method("triggered", |lua, _, key: String| {
            with_game(lua, move |game| Ok(game.input.is_triggered(&key)))
        });
        methods.add_method("pressed", |lua, _, key: String| {
            with_game(lua, move |game| Ok(game.input.is_down(&key)))
        });

        methods.add_method("pause", |lua, _, ()| {
            with_game(lua, |game| {
                game.pause();
                Ok(())
            })
        });
        methods.add_method("resume", |lua, _, ()| {
            with_game(lua, |game| {
                game.resume();
                Ok(())
            })
        });
        methods.add_method("stop_time", |lua, _, ()| {
            with_game(lua, |game| {
                let wall = game.window_ticks;
                game.clock.stop_time(wall);
                Ok(())
            })
        });
        methods.add_method("resume_time", |lua, _, ()| {
            with_game(lua, |game| {
                let wall = game.window_ticks;
                game.clock.resume_time(wall);
                Ok(())
            })
        });
        methods.add_method("quit", |lua, _, ()| {
            with_game(lua, |game| {
                game.quit_requested = true;
                Ok(())
            })
        });

        // game:save(filename, data); data is any JSON-representable table.
        methods.add_method("save", |lua, _, (filename, data): (String, Value)| {
            let json: serde_json::Value = lua.from_value(data)?;
            let text = serde_json::to_string_pretty(&json)
                .map_err(|e| mlua::Error::runtime(e.to_string()))?;
            std::fs::write(&filename, text).map_err(|e| {
                mlua::Error::runtime(format!("failed to save {}: {}", filename, e))
            })?;
            Ok(true)
        });

        // game:load(filename) -> table | nil
        methods.add_method("load", |lua, _, filename: String| {
            let Ok(text) = std::fs::read_to_string(&filename) else {
                return Ok(Value::Nil);
            };
            let json: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| mlua::Error::runtime(format!("bad save file: {}", e)))?;
            lua.to_value(&json)
        });

        methods.add_method("run_script", |lua, _, script: String| {
            let context = current_context(lua);
            with_game(lua, move |game| {
                game.pending_scripts.push((script, context));
                Ok(())
            })
        });
    }
}

// ==================== Audio handles ====================

struct MusicHandle {
    key: String,
}

impl UserData for MusicHandle {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("volume", |lua, this| {
            let key = this.key.clone();
            with_game(lua, move |game| Ok(game.audio.music_volume_of(&key)))
        });
        fields.add_field_method_get("playing", |lua, this| {
            let key = this.key.clone();
            with_game(lua, move |game| Ok(game.audio.music_playing(&key)))
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("play", |lua, this, looped: Option<bool>| {
            let key = this.key.clone();
            with_game(lua, move |game| {
                game.audio.play_music(&key, looped.unwrap_or(true));
                Ok(())
            })
        });
        methods.add_method("stop", |lua, this, ()| {
            let key = this.key.clone();
            with_game(lua, move |game| {
                game.audio.stop_music(&key);
                Ok(())
            })
        });
        methods.add_method("set_volume", |lua, this, volume: f32| {
            let key = this.key.clone();
            with_game(lua, move |game| {
                game.audio.set_music_volume(&key, volume);
                Ok(())
            })
        });
        // music:fade(target, duration) -> command
        methods.add_method("fade", |lua, this, (target, duration): (f32, i64)| {
            let ticks = game_ticks(lua)?;
            queue_command(
                lua,
                Command::MusicFade(MusicFade::new(this.key.clone(), target, ticks, duration)),
            )
        });
    }
}

struct SoundHandle {
    key: String,
}

impl UserData for SoundHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("play", |lua, this, volume: Option<f32>| {
            let key = this.key.clone();
            with_game(lua, move |game| {
                game.audio.play_sound(&key, volume.unwrap_or(1.0));
                Ok(())
            })
        });
        methods.add_method("stop", |lua, this, ()| {
            let key = this.key.clone();
            with_game(lua, move |game| {
                game.audio.stop_sound(&key);
                Ok(())
            })
        });
    }
}

// ==================== Canvas handle ====================

pub struct CanvasHandle {
    pub canvas: Rc<RefCell<Canvas>>,
}

impl UserData for CanvasHandle {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("x", |_, this| Ok(this.canvas.borrow().position().x));
        fields.add_field_method_set("x", |_, this, x: f32| {
            let mut canvas = this.canvas.borrow_mut();
            let position = canvas.position();
            canvas.set_position(Vec2::new(x, position.y));
            Ok(())
        });
        fields.add_field_method_get("y", |_, this| Ok(this.canvas.borrow().position().y));
        fields.add_field_method_set("y", |_, this, y: f32| {
            let mut canvas = this.canvas.borrow_mut();
            let position = canvas.position();
            canvas.set_position(Vec2::new(position.x, y));
            Ok(())
        });
        fields.add_field_method_get("opacity", |_, this| Ok(this.canvas.borrow().opacity()));
        fields.add_field_method_set("opacity", |_, this, opacity: f32| {
            this.canvas.borrow_mut().set_opacity(opacity);
            Ok(())
        });
        fields.add_field_method_get("angle", |_, this| {
            Ok(this.canvas.borrow().angle().unwrap_or(0.0))
        });
        fields.add_field_method_get("visible", |_, this| Ok(this.canvas.borrow().is_visible()));
        fields.add_field_method_set("visible", |_, this, visible: bool| {
            this.canvas.borrow_mut().set_visible(visible);
            Ok(())
        });
        fields.add_field_method_get("priority", |_, this| Ok(this.canvas.borrow().priority));
        fields.add_field_method_set("priority", |_, this, priority: i32| {
            this.canvas.borrow_mut().priority = priority;
            Ok(())
        });
        fields.add_field_method_get("text", |_, this| {
            Ok(this.canvas.borrow().text().map(str::to_string))
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("move", |_, this, (x, y): (f32, f32)| {
            this.canvas.borrow_mut().set_position(Vec2::new(x, y));
            Ok(())
        });
        methods.add_method("rotate", |_, this, angle: f32| {
            this.canvas.borrow_mut().set_angle(Some(angle));
            Ok(())
        });
        methods.add_method("resize", |_, this, (mag_x, mag_y): (f32, Option<f32>)| {
            this.canvas
                .borrow_mut()
                .set_magnification(Vec2::new(mag_x, mag_y.unwrap_or(mag_x)));
            Ok(())
        });
        methods.add_method("set_text", |_, this, text: String| {
            this.canvas.borrow_mut().set_text(text);
            Ok(())
        });
        methods.add_method("show", |_, this, ()| {
            this.canvas.borrow_mut().set_visible(true);
            Ok(())
        });
        methods.add_method("hide", |_, this, ()| {
            this.canvas.borrow_mut().set_visible(false);
            Ok(())
        });

        // canvas:update(x, y, mag_x, mag_y, angle, opacity, duration) -> command
        methods.add_method(
            "update",
            |lua,
             this,
             (x, y, mag_x, mag_y, angle, opacity, duration): (
                f32,
                f32,
                f32,
                f32,
                f32,
                f32,
                i64,
            )| {
                let ticks = game_ticks(lua)?;
                queue_command(
                    lua,
                    Command::CanvasUpdate(CanvasUpdate::new(
                        this.canvas.clone(),
                        Vec2::new(x, y),
                        Vec2::new(mag_x, mag_y),
                        angle,
                        opacity,
                        ticks,
                        duration,
                    )),
                )
            },
        );

        // canvas:update_opacity(opacity, duration) -> command
        methods.add_method(
            "update_opacity",
            |lua, this, (opacity, duration): (f32, i64)| {
                let ticks = game_ticks(lua)?;
                let canvas = this.canvas.borrow();
                let position = canvas.position();
                let magnification = canvas.magnification();
                let angle = canvas.angle().unwrap_or(0.0);
                drop(canvas);
                queue_command(
                    lua,
                    Command::CanvasUpdate(CanvasUpdate::new(
                        this.canvas.clone(),
                        position,
                        magnification,
                        angle,
                        opacity,
                        ticks,
                        duration,
                    )),
                )
            },
        );
    }
}

const IMAGE_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".bmp"];

fn looks_like_image(text: &str) -> bool {
    let lower = text.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

// ==================== Registration ====================

fn text_position(target: &Value) -> mlua::Result<TextPosition> {
    match target {
        Value::UserData(ud) => {
            if let Ok(object) = ud.borrow::<ObjectProxy>() {
                return Ok(TextPosition::Object(object.id));
            }
            if let Ok(position) = ud.borrow::<Vec2Lua>() {
                return Ok(TextPosition::Exact(position.0));
            }
            Err(mlua::Error::runtime("expected an object or a Vec2"))
        }
        Value::Table(table) => {
            let x: f32 = table.get("x")?;
            let y: f32 = table.get("y")?;
            Ok(TextPosition::Exact(Vec2::new(x, y)))
        }
        _ => Err(mlua::Error::runtime("expected an object or a position")),
    }
}

pub fn register(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    // Direction constants.
    globals.set("UP", Direction::UP.bits())?;
    globals.set("RIGHT", Direction::RIGHT.bits())?;
    globals.set("DOWN", Direction::DOWN.bits())?;
    globals.set("LEFT", Direction::LEFT.bits())?;
    globals.set("FORWARD", Direction::FORWARD.bits())?;
    globals.set("BACKWARD", Direction::BACKWARD.bits())?;

    // Value constructors.
    globals.set(
        "Vec2",
        lua.create_function(|_, (x, y): (f32, f32)| Ok(Vec2Lua(Vec2::new(x, y))))?,
    )?;
    globals.set(
        "Vec3",
        lua.create_function(|_, (x, y, z): (f32, f32, f32)| {
            Ok(Vec3Lua(glam::Vec3::new(x, y, z)))
        })?,
    )?;
    globals.set(
        "Vec4",
        lua.create_function(|_, (x, y, z, w): (f32, f32, f32, f32)| {
            Ok(Vec4Lua(glam::Vec4::new(x, y, z, w)))
        })?,
    )?;
    globals.set(
        "Color",
        lua.create_function(|_, args: mlua::Variadic<Value>| {
            if args.len() == 1 {
                if let Value::String(hex) = &args[0] {
                    return EngineColor::from_hex(&hex.to_string_lossy())
                        .map(ColorLua)
                        .ok_or_else(|| mlua::Error::runtime("invalid hex color"));
                }
            }
            let component = |index: usize, default: f32| -> f32 {
                match args.get(index) {
                    Some(Value::Integer(v)) => *v as f32,
                    Some(Value::Number(v)) => *v as f32,
                    _ => default,
                }
            };
            Ok(ColorLua(EngineColor::new(
                component(0, 1.0),
                component(1, 1.0),
                component(2, 1.0),
                component(3, 1.0),
            )))
        })?,
    )?;
    globals.set(
        "Rect",
        lua.create_function(|_, (x, y, w, h): (f32, f32, f32, f32)| {
            Ok(RectLua(Rect::new(x, y, w, h)))
        })?,
    )?;

    // Engine proxies.
    globals.set("game", GameProxy)?;
    globals.set("current_map", MapProxy)?;
    globals.set("camera", CameraProxy)?;

    // Canvas(filename | text, x, y) -> canvas handle
    globals.set(
        "Canvas",
        lua.create_function(|lua, (content, x, y): (String, f32, f32)| {
            let position = Vec2::new(x, y);
            let canvas = if looks_like_image(&content) {
                with_game(lua, |game| {
                    game.assets.intern_texture(&content);
                    Ok(())
                })?;
                Canvas::new_image(content, position)
            } else {
                Canvas::new_text(content, position, TextStyle::default())
            };
            let canvas = Rc::new(RefCell::new(canvas));
            with_game(lua, |game| {
                game.map.register_canvas(&canvas);
                Ok(())
            })?;
            Ok(CanvasHandle { canvas })
        })?,
    )?;

    // SpriteCanvas(sprite_file, pose, x, y) -> canvas handle
    globals.set(
        "SpriteCanvas",
        lua.create_function(
            |lua, (sprite_file, pose, x, y): (String, Option<String>, f32, f32)| {
                let canvas = with_game(lua, |game| {
                    let ticks = game.ticks();
                    let data = game
                        .assets
                        .sprite(&sprite_file)
                        .map_err(|e| mlua::Error::runtime(e.to_string()))?;
                    let mut sprite = Sprite::new(data, ticks);
                    if let Some(pose) = &pose {
                        sprite.set_pose(pose, "", Direction::NONE, true, ticks);
                    }
                    let canvas = Rc::new(RefCell::new(Canvas::new_sprite(
                        sprite,
                        Vec2::new(x, y),
                    )));
                    game.map.register_canvas(&canvas);
                    Ok(canvas)
                })?;
                Ok(CanvasHandle { canvas })
            },
        )?,
    )?;

    // Music(filename) / Sound(filename)
    globals.set(
        "Music",
        lua.create_function(|lua, filename: String| {
            let key = with_game(lua, |game| {
                let key = game.assets.intern_sound(&filename);
                game.audio.load_music(&key, &filename);
                Ok(key)
            })?;
            Ok(MusicHandle { key })
        })?,
    )?;
    globals.set(
        "Sound",
        lua.create_function(|lua, filename: String| {
            let key = with_game(lua, |game| {
                let key = game.assets.intern_sound(&filename);
                game.audio.load_sound(&key, &filename);
                Ok(key)
            })?;
            Ok(SoundHandle { key })
        })?,
    )?;

    // text(target, text [, duration]) -> command
    globals.set(
        "text",
        lua.create_function(|lua, (target, text, duration): (Value, String, Option<i64>)| {
            let position = text_position(&target)?;
            let mut options = TextOptions::new(text, position);
            options.duration = duration;
            queue_command(lua, Command::ShowText(ShowText::new(options)))
        })?,
    )?;

    // choices(target, text, {options} [, cancelable]) -> command
    globals.set(
        "choices",
        lua.create_function(
            |lua, (target, text, choices, cancelable): (Value, String, Table, Option<bool>)| {
                let position = text_position(&target)?;
                let mut list = Vec::new();
                for choice in choices.sequence_values::<String>() {
                    list.push(choice?);
                }
                let mut options = TextOptions::new(text, position).with_choices(list);
                options.cancelable = cancelable.unwrap_or(false);
                queue_command(lua, Command::ShowText(ShowText::new(options)))
            },
        )?,
    )?;

    Ok(())
}
