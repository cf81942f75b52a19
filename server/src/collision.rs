//! Collision detection: shape-pair dispatch and the recursive
//! bounding-circle refinement estimating how deeply a rotated
//! rectangle and a disc interpenetrate.
//!
//! The estimate is a signed scalar. Negative values mean separation
//! (more negative = farther apart); positive values approximate the
//! penetration depth. `INF_COLLISION` marks a region that is still
//! overlapping when the refinement budget runs out, and never escapes
//! to the caller because every level clamps to its own coarse bound.

use crate::entity::{Entity, Rectangle, Shape};
use shared::{Point, DIVIDING_LEVEL, INF_COLLISION, NO_COLLISION};

/// Signed overlap estimate between a rectangle and a disc.
pub fn collision_length(rect: &Rectangle, disc_center: Point, disc_radius: f64) -> f64 {
    check_and_divide(
        rect.angle,
        rect.bottom_left,
        rect.width,
        rect.height,
        disc_center,
        disc_radius,
        0,
    )
}

/// One refinement level over a rectangular region given by its
/// bottom-left corner and extents in the rectangle's rotated frame.
fn check_and_divide(
    angle: f64,
    bottom_left: Point,
    width: f64,
    height: f64,
    disc_center: Point,
    disc_radius: f64,
    level: u32,
) -> f64 {
    let (sin, cos) = angle.sin_cos();
    let half_w = width / 2.0;
    let half_h = height / 2.0;

    // Enclosing circle of the region: center from the rotated-frame
    // translation of the bottom-left corner, radius to that corner.
    let center = Point::new(
        bottom_left.x + half_w * cos - half_h * sin,
        bottom_left.y + half_w * sin + half_h * cos,
    );
    let radius = center.distance(&bottom_left);

    let radii_sum = radius + disc_radius;
    let centers_diff = center.distance(&disc_center);

    if centers_diff > radii_sum {
        // Provably disjoint at this refinement; finer regions give
        // tighter (less negative) estimates.
        return radii_sum - centers_diff;
    }
    if level == DIVIDING_LEVEL {
        // Out of refinement budget while still overlapping.
        return INF_COLLISION;
    }

    // Quadrant bottom-left corners in the rotated frame: bottom-left,
    // top-left, bottom-right, and the region center for top-right.
    let quadrants = [
        bottom_left,
        Point::new(bottom_left.x - half_h * sin, bottom_left.y + half_h * cos),
        Point::new(bottom_left.x + half_w * cos, bottom_left.y + half_w * sin),
        center,
    ];

    let mut max_coll = NO_COLLISION;
    for corner in quadrants {
        max_coll = max_coll.max(check_and_divide(
            angle,
            corner,
            half_w,
            half_h,
            disc_center,
            disc_radius,
            level + 1,
        ));
    }

    // Never report more overlap than the coarse bound at this level.
    max_coll.min(radii_sum - centers_diff)
}

/// Pairwise overlap estimate with explicit handling of the shape
/// pairs that have no implemented test. Rectangle-rectangle and
/// disc-disc are not yet supported and always report no collision.
pub fn pair_collision_length(a: &Entity, b: &Entity) -> f64 {
    match (a.shape(), b.shape()) {
        (Shape::Rectangle(rect), Shape::Circle(circle)) => {
            collision_length(rect, circle.center, circle.radius)
        }
        (Shape::Rectangle(rect), Shape::Robot(robot)) => {
            collision_length(rect, robot.center, robot.radius)
        }
        (Shape::Circle(circle), Shape::Rectangle(rect)) => {
            collision_length(rect, circle.center, circle.radius)
        }
        (Shape::Robot(robot), Shape::Rectangle(rect)) => {
            collision_length(rect, robot.center, robot.radius)
        }
        // Not yet supported pairs.
        (Shape::Rectangle(_), Shape::Rectangle(_)) => NO_COLLISION,
        (Shape::Circle(_) | Shape::Robot(_), Shape::Circle(_) | Shape::Robot(_)) => NO_COLLISION,
    }
}
