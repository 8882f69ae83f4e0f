//! Player controller.
//!
//! Reads the virtual input each tick, drives the player object's movement,
//! and resolves which collided object or area gets its touch, trigger, and
//! leave scripts run. Scripts are returned to the engine rather than run
//! inline so the script VM never re-enters the borrowed game state.

use crate::game::Game;
use crate::map::ObjectId;
use crate::map::collision::{CollisionCheck, CollisionRecord, CollisionType};
use crate::map::object::ScriptContext;
use crate::util::direction::Direction;

pub struct PlayerController {
    /// Solid object the player is currently touching.
    collision_object: Option<ObjectId>,
    /// Area the player is currently standing in.
    collision_area: Option<ObjectId>,
    /// Object currently outlined from the facing probe.
    facing_object: Option<ObjectId>,
}

impl Default for PlayerController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerController {
    pub fn new() -> PlayerController {
        PlayerController {
            collision_object: None,
            collision_area: None,
            facing_object: None,
        }
    }

    /// Drop any slot that names this object.
    pub fn erase_object_references(&mut self, id: ObjectId) {
        if self.collision_object == Some(id) {
            self.collision_object = None;
        }
        if self.collision_area == Some(id) {
            self.collision_area = None;
        }
        if self.facing_object == Some(id) {
            self.facing_object = None;
        }
    }

    /// One tick of player input. Returns scripts to run.
    pub fn update(&mut self, game: &mut Game) -> Vec<(String, ScriptContext)> {
        let mut scripts = Vec::new();
        let Some(player_id) = game.player_id else {
            return scripts;
        };
        if game.map.get_object(player_id).is_none() {
            return scripts;
        }
        // Ids can go stale when scripts delete objects; validate them.
        self.validate(game);

        let direction = game.input.direction();
        let action_pressed = game
            .input
            .is_triggered(&game.config.controls.action_button);

        let Some(player) = game.map.get_object(player_id) else {
            return scripts;
        };
        let (stopped, disabled, speed, facing) = (
            player.stopped,
            player.is_disabled(),
            player.speed,
            player.direction,
        );

        let record = if !stopped && !disabled && direction != Direction::NONE {
            let record = game.map.move_object(
                player_id,
                direction,
                speed,
                CollisionCheck::BOTH,
                true,
                true,
            );
            if record.collision_type == CollisionType::Object && self.surrounded(game, player_id) {
                // Boxed in by objects on every cardinal: ignore them so the
                // player cannot soft-lock. Deliberately re-checks every
                // cardinal, not just the movement direction.
                game.map.move_object(
                    player_id,
                    direction,
                    speed,
                    CollisionCheck::TILE,
                    true,
                    true,
                )
            } else {
                record
            }
        } else if stopped || disabled {
            CollisionRecord::new(CollisionType::None)
        } else {
            // Standing still: probe in place so areas and touching objects
            // stay current.
            match game.map.get_object(player_id) {
                Some(player) => game.map.passable_at(
                    player,
                    facing,
                    player.position,
                    0.0,
                    CollisionCheck::OBJECT,
                ),
                None => CollisionRecord::new(CollisionType::None),
            }
        };

        self.process_collision(game, player_id, &record, action_pressed, &mut scripts);
        self.facing_probe(game, player_id);
        scripts
    }

    fn validate(&mut self, game: &Game) {
        for slot in [
            &mut self.collision_object,
            &mut self.collision_area,
            &mut self.facing_object,
        ] {
            if let Some(id) = *slot
                && game.map.get_object(id).is_none()
            {
                *slot = None;
            }
        }
    }

    /// Impassable objects on every cardinal?
    fn surrounded(&self, game: &Game, player_id: ObjectId) -> bool {
        let Some(player) = game.map.get_object(player_id) else {
            return false;
        };
        [
            Direction::UP,
            Direction::RIGHT,
            Direction::DOWN,
            Direction::LEFT,
        ]
        .iter()
        .all(|&dir| {
            let record = game
                .map
                .passable_at(player, dir, player.position, player.speed, CollisionCheck::OBJECT);
            record.collision_type == CollisionType::Object
        })
    }

    fn process_collision(
        &mut self,
        game: &mut Game,
        player_id: ObjectId,
        record: &CollisionRecord,
        action_pressed: bool,
        scripts: &mut Vec<(String, ScriptContext)>,
    ) {
        let object_slot = self.collision_object;
        let area_slot = self.collision_area;
        let ticks = game.ticks();

        for (other, previous, is_area) in [
            (record.other_object, object_slot, false),
            (record.other_area, area_slot, true),
        ] {
            match other {
                Some(other_id) => {
                    let (touch, trigger, context, player_facing) = {
                        let Some(other) = game.map.get_object(other_id) else {
                            continue;
                        };
                        (
                            other.touch_script.clone(),
                            other.trigger_script.clone(),
                            other.script_context,
                            other.properties.get("player-facing") != Some("false"),
                        )
                    };
                    // Touch fires once when the slot changes.
                    if previous != Some(other_id) && !touch.is_empty() {
                        scripts.push((touch, context));
                        if let Some(other) = game.map.get_object_mut(other_id) {
                            other.triggered_object_id = Some(player_id);
                        }
                    }
                    if action_pressed && !trigger.is_empty() {
                        if player_facing {
                            let player_position = game
                                .map
                                .get_object(player_id)
                                .map(|p| p.centered_position());
                            if let (Some(position), Some(other)) =
                                (player_position, game.map.get_object_mut(other_id))
                            {
                                other.face_towards(position, ticks);
                            }
                        }
                        if let Some(player) = game.map.get_object_mut(player_id) {
                            player.triggered_object_id = Some(other_id);
                        }
                        scripts.push((trigger, context));
                    }
                    if is_area {
                        self.collision_area = Some(other_id);
                        if let Some(player) = game.map.get_object_mut(player_id) {
                            player.collision_area_id = Some(other_id);
                        }
                    } else {
                        self.collision_object = Some(other_id);
                    }
                }
                None => {
                    // Left the object/area: run its leave script once.
                    if let Some(previous_id) = previous {
                        let leave = game
                            .map
                            .get_object(previous_id)
                            .map(|o| (o.leave_script.clone(), o.script_context));
                        if let Some((leave, context)) = leave
                            && !leave.is_empty()
                        {
                            scripts.push((leave, context));
                        }
                    }
                    if is_area {
                        self.collision_area = None;
                        if let Some(player) = game.map.get_object_mut(player_id) {
                            player.collision_area_id = None;
                        }
                    } else {
                        self.collision_object = None;
                    }
                }
            }
        }
    }

    /// Probe the facing direction so an object the player looks at can be
    /// outlined even without movement.
    fn facing_probe(&mut self, game: &mut Game, player_id: ObjectId) {
        let probe = {
            let Some(player) = game.map.get_object(player_id) else {
                self.facing_object = None;
                return;
            };
            game.map.passable_at(
                player,
                player.direction,
                player.position,
                player.speed,
                CollisionCheck::OBJECT | CollisionCheck::PROXIMITY,
            )
        };
        let new_target = probe.other_object;
        if self.facing_object != new_target {
            if let Some(old) = self.facing_object
                && let Some(object) = game.map.get_object_mut(old)
            {
                object.outlining_object_id = None;
            }
            if let Some(new_id) = new_target
                && let Some(object) = game.map.get_object_mut(new_id)
            {
                object.outlining_object_id = Some(player_id);
            }
            self.facing_object = new_target;
        }
    }

    pub fn facing_object(&self) -> Option<ObjectId> {
        self.facing_object
    }

    pub fn collision_object(&self) -> Option<ObjectId> {
        self.collision_object
    }

    pub fn collision_area(&self) -> Option<ObjectId> {
        self.collision_area
    }
}
