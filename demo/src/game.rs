//! Colored rectangles living in an `edict` world, stepped at a fixed rate.

use std::time::Duration;

use edict::{system::IntoSystem, ActionEncoder, Component, Entities, Scheduler, World};

#[derive(Clone, Copy, Debug, Default, PartialEq, Component)]
pub struct Transform {
    pub position: [f32; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Component)]
pub struct Rect {
    pub size: [f32; 2],
    pub color: [f32; 4],
}

/// Pixels per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Component)]
pub struct Velocity(pub [f32; 2]);

/// Marks the entity steered from input.
#[derive(Clone, Copy, Debug, Component)]
pub struct Player;

/// Area entities are kept inside, in pixels.
#[derive(Clone, Copy, Debug)]
pub struct Bounds(pub [f32; 2]);

/// Direction the player is pushed in, each axis in `-1..=1`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Input(pub [f32; 2]);

/// Length of the current fixed step in seconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct Step(pub f32);

/// World plus the schedulers that run on it.
pub struct Game {
    world: World,
    startup: Scheduler,
    fixed: Scheduler,
    dispose: Scheduler,
    started: bool,
}

impl Game {
    pub fn new(bounds: [f32; 2]) -> Self {
        let mut world = World::new();
        world.insert_resource(Bounds(bounds));
        world.insert_resource(Input::default());
        world.insert_resource(Step::default());

        Game {
            world,
            startup: Scheduler::new(),
            fixed: Scheduler::new(),
            dispose: Scheduler::new(),
            started: false,
        }
    }

    pub fn add_startup_system<Marker>(&mut self, system: impl IntoSystem<Marker>) -> &mut Self {
        self.startup.add_system(system);
        self
    }

    pub fn add_system<Marker>(&mut self, system: impl IntoSystem<Marker>) -> &mut Self {
        self.fixed.add_system(system);
        self
    }

    pub fn add_dispose_system<Marker>(&mut self, system: impl IntoSystem<Marker>) -> &mut Self {
        self.dispose.add_system(system);
        self
    }

    pub fn bounds(&self) -> [f32; 2] {
        self.world.expect_resource::<Bounds>().0
    }

    pub fn set_bounds(&mut self, bounds: [f32; 2]) {
        self.world.insert_resource(Bounds(bounds));
    }

    pub fn set_input(&mut self, input: [f32; 2]) {
        self.world
            .insert_resource(Input(input.map(|axis| axis.clamp(-1.0, 1.0))));
    }

    /// Runs startup systems. Only the first call has effect.
    pub fn startup(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.startup.run_sequential(&mut self.world);
    }

    /// Runs one fixed step.
    pub fn update(&mut self, step: Duration) {
        self.startup();
        self.world.insert_resource(Step(step.as_secs_f32()));
        self.fixed.run_sequential(&mut self.world);
    }

    pub fn dispose(&mut self) {
        self.dispose.run_sequential(&mut self.world);
        self.started = false;
    }

    /// Every rectangle with its placement.
    pub fn sprites(&self) -> Vec<(Transform, Rect)> {
        let mut sprites = Vec::new();
        self.world
            .query::<(&Transform, &Rect)>()
            .for_each(|(transform, rect)| sprites.push((*transform, *rect)));
        sprites
    }
}

const PLAYER_SPEED: f32 = 240.0;

/// Spawns the bouncing rectangles and the player.
pub fn spawn_scene(world: &World, mut actions: ActionEncoder) {
    let [width, height] = world.expect_resource::<Bounds>().0;

    let palette = [
        [0.90, 0.30, 0.25, 1.0],
        [0.25, 0.70, 0.35, 1.0],
        [0.25, 0.45, 0.90, 1.0],
        [0.95, 0.80, 0.25, 1.0],
    ];

    for (i, color) in palette.into_iter().enumerate() {
        let position = [
            width * (0.1 + 0.2 * i as f32),
            height * (0.2 + 0.1 * (i % 2) as f32),
        ];
        actions.spawn((
            Transform { position },
            Rect {
                size: [width / 8.0, height / 8.0],
                color,
            },
            Velocity([60.0 * (i as f32 - 1.5), 40.0]),
        ));
    }

    actions.spawn((
        Transform {
            position: [width / 2.0, height / 2.0],
        },
        Rect {
            size: [32.0, 32.0],
            color: [1.0, 1.0, 1.0, 0.8],
        },
        Velocity::default(),
        Player,
    ));

    tracing::info!("spawned {} entities", palette.len() + 1);
}

/// Steers the player from input.
pub fn steer_player(world: &World) {
    let input = world.expect_resource::<Input>().0;
    world
        .query::<(&mut Velocity, &Player)>()
        .for_each(|(velocity, _)| velocity.0 = input.map(|axis| axis * PLAYER_SPEED));
}

/// Moves every entity and bounces it off the bounds. The player stops at the edge.
pub fn move_entities(world: &World) {
    let delta = world.expect_resource::<Step>().0;
    let bounds = world.expect_resource::<Bounds>().0;

    world
        .query::<(&mut Transform, &mut Velocity, &Rect, Option<&Player>)>()
        .for_each(|(transform, velocity, rect, player)| {
            for axis in 0..2 {
                let max = (bounds[axis] - rect.size[axis]).max(0.0);
                let mut position = transform.position[axis] + velocity.0[axis] * delta;

                if position < 0.0 {
                    position = 0.0;
                    if player.is_none() {
                        velocity.0[axis] = velocity.0[axis].abs();
                    }
                } else if position > max {
                    position = max;
                    if player.is_none() {
                        velocity.0[axis] = -velocity.0[axis].abs();
                    }
                }

                transform.position[axis] = position;
            }
        });
}

pub fn despawn_all(world: &World, mut actions: ActionEncoder) {
    let mut count = 0;
    world
        .query::<(Entities, &Transform)>()
        .for_each(|(entity, _)| {
            actions.despawn(entity);
            count += 1;
        });
    tracing::info!("despawning {count} entities");
}
