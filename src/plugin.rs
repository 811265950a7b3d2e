use bevy::{prelude::*, window::PrimaryWindow};

use crate::{
    config::{GraphSettings, parse_hex_color},
    controller::{FlyKey, Pose},
    graph::Graph,
    scene::{ChunkEntities, GraphScene, StylePalettes},
};

/// System sets for the graph pipeline, chained in this order every frame.
///
/// ```text
/// FlyGraphSet::Input  →  FlyGraphSet::Stream  →  FlyGraphSet::Sync
/// ```
///
/// Register functions or teleport the camera before [`FlyGraphSet::Stream`] to
/// see the result on the same frame:
///
/// ```rust,ignore
/// app.add_systems(Update, jump_to_origin.before(FlyGraphSet::Stream));
/// ```
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlyGraphSet {
    /// Feeds keyboard and mouse input into the graph's [`FlyController`](crate::controller::FlyController).
    Input,
    /// Advances the camera and streams chunks in and out of the scene.
    Stream,
    /// Copies the camera pose onto every [`FlyCamera`] transform.
    Sync,
}

/// Marks the camera driven by the graph's pose.
#[derive(Component, Default)]
pub struct FlyCamera;

/// Key bindings for the fly controller.
///
/// Defaults: `W`/`S` forward/back, `A`/`D` left/right, `R`/`F` up/down, `Shift` boost.
#[derive(Resource, Clone, Debug)]
pub struct FlyKeyBindings {
    pub keys: Vec<(KeyCode, FlyKey)>,
    /// Held to drag the look direction.
    pub look_button: MouseButton,
}

impl Default for FlyKeyBindings {
    fn default() -> Self {
        Self {
            keys: vec![
                (KeyCode::KeyW, FlyKey::Forward),
                (KeyCode::KeyS, FlyKey::Back),
                (KeyCode::KeyA, FlyKey::Left),
                (KeyCode::KeyD, FlyKey::Right),
                (KeyCode::KeyR, FlyKey::Up),
                (KeyCode::KeyF, FlyKey::Down),
                (KeyCode::ShiftLeft, FlyKey::Boost),
                (KeyCode::ShiftRight, FlyKey::Boost),
            ],
            look_button: MouseButton::Left,
        }
    }
}

/// Bevy plugin that streams a [`Graph`]'s surfaces around a free-fly camera.
///
/// Inserts the [`Graph`] resource; add functions to it from a startup system:
///
/// ```rust,ignore
/// fn setup(mut graph: ResMut<Graph>) {
///     graph.add_function(|x, z| (x * 0.01).sin() * (z * 0.01).cos() * 200., &toml::Value::Table(default()));
/// }
/// ```
///
/// ```text
/// Startup:  clear color, fly camera (spawn_camera)
/// Update:   read input → Graph::tick → chunk entities spawned/despawned → camera transform
/// ```
pub struct FlyGraphPlugin {
    pub settings: GraphSettings,
    /// Call [`Graph::draw`] when the plugin is built.
    pub autostart: bool,
    /// Spawn a [`Camera3d`] tagged [`FlyCamera`] on startup.
    pub spawn_camera: bool,
}

impl Default for FlyGraphPlugin {
    fn default() -> Self {
        Self {
            settings: GraphSettings::default(),
            autostart: true,
            spawn_camera: true,
        }
    }
}

impl Plugin for FlyGraphPlugin {
    fn build(&self, app: &mut App) {
        let mut graph = Graph::new(self.settings.clone()).unwrap_or_else(|err| {
            error!("FlyGraphPlugin: invalid settings ({err}), using defaults");
            Graph::default()
        });
        if self.autostart {
            graph.draw();
        }
        let show_axes = graph.settings().show_axes;

        app.insert_resource(graph)
            .init_resource::<ChunkEntities>()
            .init_resource::<StylePalettes>()
            .init_resource::<FlyKeyBindings>()
            .configure_sets(
                Update,
                (FlyGraphSet::Input, FlyGraphSet::Stream, FlyGraphSet::Sync).chain(),
            )
            .add_systems(Startup, apply_clear_color)
            .add_systems(
                Update,
                (
                    read_fly_input.in_set(FlyGraphSet::Input),
                    stream_chunks.in_set(FlyGraphSet::Stream),
                    sync_fly_camera.in_set(FlyGraphSet::Sync),
                ),
            );

        if self.spawn_camera {
            app.add_systems(Startup, spawn_fly_camera);
        }
        if show_axes {
            app.add_systems(Update, draw_axes);
        }
    }
}

fn apply_clear_color(mut commands: Commands, graph: Res<Graph>) {
    match parse_hex_color(&graph.settings().bg_color) {
        Ok([r, g, b]) => commands.insert_resource(ClearColor(Color::srgb(r, g, b))),
        Err(err) => warn!("bg_color: {err}"),
    }
}

fn spawn_fly_camera(mut commands: Commands, graph: Res<Graph>) {
    commands.spawn((
        Camera3d::default(),
        Projection::from(PerspectiveProjection {
            fov: 45_f32.to_radians(),
            near: 0.1,
            far: graph.settings().camera_far,
            ..default()
        }),
        pose_transform(&graph.pose()),
        FlyCamera,
    ));
}

/// Translates key and drag input into [`FlyController`](crate::controller::FlyController) events.
fn read_fly_input(
    keys: Res<ButtonInput<KeyCode>>,
    buttons: Res<ButtonInput<MouseButton>>,
    bindings: Res<FlyKeyBindings>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut graph: ResMut<Graph>,
) {
    let alt = keys.any_pressed([KeyCode::AltLeft, KeyCode::AltRight]);
    let controller = graph.controller_mut();

    for &(key, fly_key) in &bindings.keys {
        if keys.just_pressed(key) {
            controller.key_down(fly_key, alt);
        }
        if keys.just_released(key) {
            controller.key_up(fly_key);
        }
    }

    if buttons.just_released(bindings.look_button) {
        controller.pointer_up();
    }
    let Some(cursor) = windows.single().ok().and_then(Window::cursor_position) else {
        return;
    };
    if buttons.just_pressed(bindings.look_button) {
        controller.pointer_down(cursor.x, cursor.y);
    } else if buttons.pressed(bindings.look_button) {
        controller.pointer_move(cursor.x, cursor.y);
    }
}

/// Ticks the graph, spawning and despawning chunk entities through [`GraphScene`].
fn stream_chunks(time: Res<Time>, mut graph: ResMut<Graph>, mut scene: GraphScene) {
    scene.sync_palettes(&graph);
    let report = graph.tick(time.delta_secs(), &mut scene);
    let (built, removed) = (report.built(), report.removed());
    if built + removed > 0 {
        debug!("streamed chunks: {built} built, {removed} removed");
    }
}

fn sync_fly_camera(graph: Res<Graph>, mut cameras: Query<&mut Transform, With<FlyCamera>>) {
    let transform = pose_transform(&graph.pose());
    for mut camera in &mut cameras {
        *camera = transform;
    }
}

fn draw_axes(mut gizmos: Gizmos) {
    const LENGTH: f32 = 1000.;
    gizmos.line(Vec3::ZERO, Vec3::X * LENGTH, Color::srgb(1., 0., 0.));
    gizmos.line(Vec3::ZERO, Vec3::Y * LENGTH, Color::srgb(0., 1., 0.));
    gizmos.line(Vec3::ZERO, Vec3::Z * LENGTH, Color::srgb(0., 0., 1.));
}

/// Converts a [`Pose`] into a Bevy [`Transform`].
pub fn pose_transform(pose: &Pose) -> Transform {
    let p = pose.position;
    let q = pose.rotation();
    Transform {
        translation: Vec3::new(p.x, p.y, p.z),
        rotation: Quat::from_xyzw(q.i, q.j, q.k, q.w),
        ..default()
    }
}
