use bevy::prelude::*;
use bevy_fly_graph::{
    FlyGraphPlugin, Graph, config::GraphSettings, plugin::FlyGraphSet, scene::GraphScene,
};

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            FlyGraphPlugin {
                settings: GraphSettings {
                    camera_far: 1000.,
                    scale: 100.,
                    ..default()
                },
                ..default()
            },
        ))
        .add_systems(Startup, register)
        .add_systems(Update, controls.before(FlyGraphSet::Stream))
        .run();
}

fn options(source: &str) -> toml::Value {
    match toml::from_str(source) {
        Ok(table) => toml::Value::Table(table),
        Err(err) => {
            error!("options: {err}");
            toml::Value::Table(default())
        }
    }
}

fn register(mut graph: ResMut<Graph>) {
    graph.add_function(|x, z| x.sin() * z.cos() - 3., &options("grid_step = 25.0"));
    graph.add_function(
        |x, z| (x * x + z * z).sqrt().cos() + 3.,
        &options(
            r##"
            style = "xLines"
            lines = { color = "#0050ff" }
            dots = { visible = true, color = "#202020" }
            "##,
        ),
    );
    // Rejected: logged and skipped, the other functions keep streaming.
    graph.add_function(|x, _| x, &options("grid_step = 0.0"));
}

/// `Space` stops and restarts streaming, `C` clears every function, `N` registers a new one once cleared.
fn controls(keys: Res<ButtonInput<KeyCode>>, mut graph: ResMut<Graph>, mut scene: GraphScene) {
    if keys.just_pressed(KeyCode::Space) {
        if graph.is_running() {
            graph.stop();
        } else {
            graph.draw();
        }
    }
    if keys.just_pressed(KeyCode::KeyC) {
        graph.clear(&mut scene);
    }
    if keys.just_pressed(KeyCode::KeyN) && graph.functions().is_empty() {
        graph.add_function(|x, z| (x * z).sin(), &options("style = 'zLines'"));
    }
}
