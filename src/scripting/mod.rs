//! Embedded Lua runtime.
//!
//! Scripts run as Lua coroutines resumed once per tick. Async engine work is
//! expressed as commands: a binding queues the command and returns a handle,
//! and the prelude's `Command:wait()` yields until the scheduler reports it
//! complete. Script errors terminate only the offending coroutine; the
//! simulation carries on.

pub mod bindings;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mlua::{Lua, Thread, ThreadStatus};

use crate::error::Result;
use crate::game::Game;
use crate::map::object::ScriptContext;

/// Lua helper definitions loaded at startup: command wrappers and the
/// yield-until-predicate wait functions.
const PRELUDE: &str = include_str!("prelude.lua");

/// Shared state reachable from binding closures via Lua app data.
pub(crate) struct ScriptState {
    pub game: Rc<RefCell<Game>>,
    /// Context of the task currently being resumed; commands and scripts
    /// queued from Lua inherit it.
    pub context: Cell<ScriptContext>,
}

struct ScriptTask {
    thread: Thread,
    context: ScriptContext,
    name: String,
}

pub struct ScriptEngine {
    lua: Lua,
    tasks: Vec<ScriptTask>,
}

impl ScriptEngine {
    pub fn new(game: Rc<RefCell<Game>>) -> Result<ScriptEngine> {
        let lua = Lua::new();
        lua.set_app_data(ScriptState {
            game,
            context: Cell::new(ScriptContext::Map),
        });
        bindings::register(&lua)?;
        lua.load(PRELUDE).set_name("prelude").exec()?;
        let engine = ScriptEngine {
            lua,
            tasks: Vec::new(),
        };
        engine.refresh_player_global();
        Ok(engine)
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Start a script from inline source or a `.lua` file path. The first
    /// resume happens immediately so synchronous scripts finish in one call.
    pub fn run(&mut self, script: &str, context: ScriptContext) -> Result<()> {
        let (source, name) = if script.ends_with(".lua") && std::path::Path::new(script).exists() {
            let source = std::fs::read_to_string(script).map_err(|source| crate::Error::Asset {
                path: script.to_string(),
                source,
            })?;
            (source, script.to_string())
        } else {
            (script.to_string(), "inline".to_string())
        };

        let function = self.lua.load(&source).set_name(&name).into_function()?;
        let thread = self.lua.create_thread(function)?;
        let mut task = ScriptTask {
            thread,
            context,
            name,
        };
        if self.resume_task(&mut task) {
            self.tasks.push(task);
        }
        Ok(())
    }

    /// Resume every live coroutine once.
    pub fn update(&mut self) {
        self.update_filtered(None);
    }

    /// Resume only global-context coroutines (used while paused).
    pub fn update_global_only(&mut self) {
        self.update_filtered(Some(ScriptContext::Global));
    }

    fn update_filtered(&mut self, only: Option<ScriptContext>) {
        let mut tasks = std::mem::take(&mut self.tasks);
        tasks.retain_mut(|task| {
            if let Some(context) = only
                && task.context != context
            {
                return true; // skipped, stays scheduled
            }
            self.resume_task(task)
        });
        // Tasks spawned during the pass (none today) would land behind the
        // retained ones.
        tasks.append(&mut self.tasks);
        self.tasks = tasks;
    }

    /// Returns whether the task should stay scheduled.
    fn resume_task(&self, task: &mut ScriptTask) -> bool {
        if task.thread.status() != ThreadStatus::Resumable {
            return false;
        }
        self.set_context(task.context);
        match task.thread.resume::<mlua::MultiValue>(()) {
            Ok(_) => task.thread.status() == ThreadStatus::Resumable,
            Err(e) => {
                log::error!("Script error in {}: {}", task.name, e);
                false
            }
        }
    }

    fn set_context(&self, context: ScriptContext) {
        if let Some(state) = self.lua.app_data_ref::<ScriptState>() {
            state.context.set(context);
        }
    }

    /// Map-context coroutines die with their map.
    pub fn drop_map_tasks(&mut self) {
        self.tasks.retain(|task| task.context != ScriptContext::Map);
    }

    /// Point the `player` global at the current player object.
    pub fn refresh_player_global(&self) {
        let player_id = self
            .lua
            .app_data_ref::<ScriptState>()
            .and_then(|state| state.game.try_borrow().ok().map(|game| game.player_id));
        let globals = self.lua.globals();
        match player_id.flatten() {
            Some(id) => {
                let _ = globals.set("player", bindings::ObjectProxy { id });
            }
            None => {
                let _ = globals.set("player", mlua::Value::Nil);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn engine() -> ScriptEngine {
        let game = Rc::new(RefCell::new(Game::new(Config::new())));
        ScriptEngine::new(game).unwrap()
    }

    #[test]
    fn test_synchronous_script_finishes_immediately() {
        let mut engine = engine();
        engine.run("local x = 1 + 1", ScriptContext::Map).unwrap();
        assert_eq!(engine.task_count(), 0);
    }

    #[test]
    fn test_yielding_script_stays_scheduled() {
        let mut engine = engine();
        engine
            .run("coroutine.yield(); coroutine.yield()", ScriptContext::Map)
            .unwrap();
        assert_eq!(engine.task_count(), 1);
        engine.update();
        assert_eq!(engine.task_count(), 1);
        engine.update();
        assert_eq!(engine.task_count(), 0);
    }

    #[test]
    fn test_script_error_terminates_only_that_task() {
        let mut engine = engine();
        engine
            .run("coroutine.yield(); error('boom')", ScriptContext::Map)
            .unwrap();
        engine
            .run("coroutine.yield(); coroutine.yield()", ScriptContext::Global)
            .unwrap();
        assert_eq!(engine.task_count(), 2);
        engine.update();
        // The failing task is gone, the healthy one remains.
        assert_eq!(engine.task_count(), 1);
    }

    #[test]
    fn test_compile_error_is_reported() {
        let mut engine = engine();
        assert!(engine.run("this is not lua", ScriptContext::Map).is_err());
    }

    #[test]
    fn test_drop_map_tasks_spares_global() {
        let mut engine = engine();
        engine.run("coroutine.yield()", ScriptContext::Map).unwrap();
        engine
            .run("coroutine.yield()", ScriptContext::Global)
            .unwrap();
        engine.drop_map_tasks();
        assert_eq!(engine.task_count(), 1);
    }

    #[test]
    fn test_prelude_defines_wait_helpers() {
        let engine = engine();
        let globals = engine.lua().globals();
        assert!(globals.contains_key("wait").unwrap());
        assert!(globals.contains_key("wait_press").unwrap());
        assert!(globals.contains_key("Command").unwrap());
    }
}
