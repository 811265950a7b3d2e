use nalgebra::UnitQuaternion;

use crate::types::{Point, Value, Vector};

/// Vertical look angle limit in degrees.
pub const MAX_LATITUDE: Value = 85.;

/// Movement keys understood by [`FlyController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlyKey {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
    /// Held to move at [`FlyController::shift_speed`].
    Boost,
}

/// Camera position and look direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Point,
    /// Unit vector the camera looks along.
    pub forward: Vector,
}

impl Pose {
    /// Rotation turning the camera's `-Z` axis onto [`forward`](Pose::forward), with `+Y` up.
    pub fn rotation(&self) -> UnitQuaternion<Value> {
        UnitQuaternion::face_towards(&-self.forward, &Vector::y())
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct MoveState {
    forward: bool,
    back: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
    boost: bool,
}

impl MoveState {
    fn key(&mut self, key: FlyKey) -> &mut bool {
        match key {
            FlyKey::Forward => &mut self.forward,
            FlyKey::Back => &mut self.back,
            FlyKey::Left => &mut self.left,
            FlyKey::Right => &mut self.right,
            FlyKey::Up => &mut self.up,
            FlyKey::Down => &mut self.down,
            FlyKey::Boost => &mut self.boost,
        }
    }

    /// Movement in camera space: `+x` right, `+y` up, `+z` back.
    fn vector(&self) -> Vector {
        let axis = |pos: bool, neg: bool| pos as i8 as Value - neg as i8 as Value;
        Vector::new(
            axis(self.right, self.left),
            axis(self.up, self.down),
            axis(self.back, self.forward),
        )
    }
}

/// Free-fly camera driven by movement keys and pointer drags.
///
/// While the pointer button is held, the offset between the press point and
/// the current pointer position acts as a turn rate, so dragging further turns
/// faster. Latitude is clamped to `±MAX_LATITUDE`.
#[derive(Clone, Debug)]
pub struct FlyController {
    pub movement_speed: Value,
    pub shift_speed: Value,
    pub look_speed: Value,
    position: Point,
    /// Degrees above the horizon.
    lat: Value,
    /// Degrees around `+Y`, `0` looking along `+X`.
    lon: Value,
    moves: MoveState,
    drag_origin: Option<(Value, Value)>,
    drag: (Value, Value),
}

impl Default for FlyController {
    fn default() -> Self {
        Self {
            movement_speed: 1000.,
            shift_speed: 3000.,
            look_speed: 1.,
            position: Point::origin(),
            lat: 0.,
            lon: 0.,
            moves: MoveState::default(),
            drag_origin: None,
            drag: (0., 0.),
        }
    }
}

impl FlyController {
    pub fn new(position: Point) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Ignored while Alt is held so system shortcuts don't start movement.
    pub fn key_down(&mut self, key: FlyKey, alt_held: bool) {
        if alt_held {
            return;
        }
        *self.moves.key(key) = true;
    }

    pub fn key_up(&mut self, key: FlyKey) {
        *self.moves.key(key) = false;
    }

    pub fn pointer_down(&mut self, x: Value, y: Value) {
        self.drag_origin = Some((x, y));
    }

    pub fn pointer_move(&mut self, x: Value, y: Value) {
        if let Some((ox, oy)) = self.drag_origin {
            self.drag = (x - ox, y - oy);
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag_origin = None;
        self.drag = (0., 0.);
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }

    /// Teleports the camera without changing where it looks.
    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    /// Points the camera at the given angles, in degrees. Latitude is clamped.
    pub fn set_look(&mut self, lat: Value, lon: Value) {
        self.lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        self.lon = lon;
    }

    pub fn latitude(&self) -> Value {
        self.lat
    }

    pub fn longitude(&self) -> Value {
        self.lon
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            forward: self.forward(),
        }
    }

    /// Advances the camera by `delta` seconds and returns the new pose.
    pub fn update(&mut self, delta: Value) -> Pose {
        let speed = if self.moves.boost {
            self.shift_speed
        } else {
            self.movement_speed
        };
        let move_step = delta * speed;
        let look_step = delta * self.look_speed;

        // Translate along the axes the camera had at the start of the tick.
        let forward = self.forward();
        let right = forward.cross(&Vector::y()).normalize();
        let up = right.cross(&forward);
        let moves = self.moves.vector();
        self.position += (right * moves.x + up * moves.y - forward * moves.z) * move_step;

        self.lat = (self.lat - self.drag.1 * look_step).clamp(-MAX_LATITUDE, MAX_LATITUDE);
        self.lon += self.drag.0 * look_step;

        self.pose()
    }

    fn forward(&self) -> Vector {
        let phi = (90. - self.lat).to_radians();
        let theta = self.lon.to_radians();
        Vector::new(
            phi.sin() * theta.cos(),
            phi.cos(),
            phi.sin() * theta.sin(),
        )
    }
}
