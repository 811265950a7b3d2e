use bevy::prelude::*;
use bevy_fly_graph::{
    FlyGraphPlugin, Graph,
    config::{FunctionOptions, GraphSettings, PlatesOptions, Style},
    plugin::FlyGraphSet,
    types::Point,
};
use std::sync::Arc;

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            FlyGraphPlugin {
                settings: GraphSettings {
                    camera_far: 2000.,
                    bg_color: "#101018".into(),
                    ..default()
                },
                ..default()
            },
        ))
        .add_systems(Startup, setup)
        .add_systems(Update, teleport_home.before(FlyGraphSet::Stream))
        .run();
}

fn setup(mut commands: Commands, mut graph: ResMut<Graph>) {
    commands.spawn((
        DirectionalLight {
            illuminance: light_consts::lux::FULL_DAYLIGHT,
            ..Default::default()
        },
        Transform::default().with_rotation(Quat::from_rotation_x(-45.0_f32.to_radians())),
    ));

    let ripple = |x: f32, z: f32| {
        let r = x.hypot(z);
        (r * 0.01).sin() * 150. - 300.
    };
    let options = FunctionOptions {
        style: Style::Plates,
        grid_step: 40.,
        plates: PlatesOptions {
            color: "#3a7bd5".into(),
        },
        ..default()
    };
    if let Err(err) = graph.add_function_with(Arc::new(ripple), options) {
        error!("ripple: {err}");
    }
    graph.set_position(Point::new(0., 200., 0.));
}

/// `H` jumps back above the origin.
fn teleport_home(keys: Res<ButtonInput<KeyCode>>, mut graph: ResMut<Graph>) {
    if keys.just_pressed(KeyCode::KeyH) {
        graph.set_position(Point::new(0., 200., 0.));
    }
}
