use super::{Point, Station};
use rand::Rng;

/// Kinematic parameters shared by every tag in a run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementParams {
    /// Distance covered per tick
    pub speed: f64,
    /// Gate each tick on the station's randomizer
    pub realistic_movement: bool,
    /// Per-axis distance at which a target counts as reached
    pub target_proximity: f64,
    pub size_x: u32,
    pub size_y: u32,
}

impl Station {
    /// Advance a tag one tick toward its target point.
    ///
    /// Returns true if the position was written, so the caller knows to
    /// recompute distances. Anchors and untyped stations never move. With
    /// realistic movement on, a uniform draw above the randomizer skips the
    /// tick. The new position is clamped into the plane; once within
    /// `target_proximity` of the target on both axes a new target is drawn
    /// anywhere on the plane.
    pub fn step<R: Rng + ?Sized>(&mut self, params: &MovementParams, rng: &mut R) -> bool {
        if !self.is_tag() {
            return false;
        }

        if params.realistic_movement && rng.gen::<f64>() > self.randomizer() {
            return false;
        }

        let position = self.position();
        let target = self.target_point();
        let angle = (target.y - position.y).atan2(target.x - position.x);

        let next = Point::new(
            position.x + params.speed * angle.cos(),
            position.y + params.speed * angle.sin(),
        )
        .clamped(f64::from(params.size_x), f64::from(params.size_y));

        self.set_position(next);

        if (next.x - target.x).abs() < params.target_proximity
            && (next.y - target.y).abs() < params.target_proximity
        {
            self.set_target_point(random_point(params.size_x, params.size_y, rng));
        }

        true
    }

    /// Place the station on a random integer coordinate of the plane
    pub fn set_random_position<R: Rng + ?Sized>(&mut self, size_x: u32, size_y: u32, rng: &mut R) {
        self.set_position(random_point(size_x, size_y, rng));
    }

    /// Pick a target within `offset_radius` of the current position on each
    /// axis, clamped into the plane
    pub fn set_random_target_point<R: Rng + ?Sized>(
        &mut self,
        size_x: u32,
        size_y: u32,
        offset_radius: u32,
        rng: &mut R,
    ) {
        let radius = i64::from(offset_radius);
        let position = self.position();
        let target = Point::new(
            position.x + rng.gen_range(-radius..=radius) as f64,
            position.y + rng.gen_range(-radius..=radius) as f64,
        )
        .clamped(f64::from(size_x), f64::from(size_y));

        self.set_target_point(target);
    }
}

/// Uniform integer point in `[0, size_x] x [0, size_y]`
pub fn random_point<R: Rng + ?Sized>(size_x: u32, size_y: u32, rng: &mut R) -> Point {
    Point::new(
        f64::from(rng.gen_range(0..=size_x)),
        f64::from(rng.gen_range(0..=size_y)),
    )
}
