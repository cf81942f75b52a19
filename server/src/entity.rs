//! Entity model: the closed set of simulated shapes.
//!
//! Every entity carries identity, a mass weight used by collision
//! resolution, and a mobility flag. Geometry is variant-specific;
//! callers dispatch on the [`Shape`] tag rather than assuming a common
//! representation.

use shared::{
    Point, WireError, WireReader, WireWriter, SHAPE_CIRCLE, SHAPE_KHEPERA_ROBOT, SHAPE_RECTANGLE,
};

/// Axis-independent rectangle, rotated by `angle` radians about its
/// bottom-left corner. The center and corners are derived values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub bottom_left: Point,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl Rectangle {
    pub fn new(bottom_left: Point, width: f64, height: f64, angle: f64) -> Self {
        Self {
            bottom_left,
            width,
            height,
            angle,
        }
    }

    /// Geometric center, accounting for the rotation about the
    /// bottom-left corner.
    pub fn center(&self) -> Point {
        let (sin, cos) = self.angle.sin_cos();
        Point::new(
            self.bottom_left.x + (self.width * cos - self.height * sin) / 2.0,
            self.bottom_left.y + (self.width * sin + self.height * cos) / 2.0,
        )
    }

    /// Corners in wire order: bottom-left, top-left, top-right,
    /// bottom-right.
    pub fn corners(&self) -> [Point; 4] {
        let (sin, cos) = self.angle.sin_cos();
        let bl = self.bottom_left;
        let tl = Point::new(bl.x - self.height * sin, bl.y + self.height * cos);
        let tr = Point::new(tl.x + self.width * cos, tl.y + self.width * sin);
        let br = Point::new(bl.x + self.width * cos, bl.y + self.width * sin);
        [bl, tl, tr, br]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point, radius: f64) -> Self {
        Self { center, radius }
    }
}

/// A Khepera robot is a disc for collision purposes, with a heading
/// and two wheel speeds that its controller mutates. Wheel speeds are
/// integrated into a translation once per simulation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Robot {
    pub center: Point,
    pub radius: f64,
    pub heading: f64,
    pub left_speed: f64,
    pub right_speed: f64,
}

impl Robot {
    pub fn new(center: Point, radius: f64, heading: f64) -> Self {
        Self {
            center,
            radius,
            heading,
            left_speed: 0.0,
            right_speed: 0.0,
        }
    }
}

/// Closed sum over the supported shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Rectangle(Rectangle),
    Circle(Circle),
    Robot(Robot),
}

/// A simulated object. `id`, `weight`, `movable` and the shape variant
/// are fixed at construction; only geometry inside the variant moves.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: u16,
    weight: u32,
    movable: bool,
    shape: Shape,
}

impl Entity {
    pub fn new(id: u16, weight: u32, movable: bool, shape: Shape) -> Self {
        Self {
            id,
            weight,
            movable,
            shape,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn movable(&self) -> bool {
        self.movable
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_mut(&mut self) -> &mut Shape {
        &mut self.shape
    }

    pub fn shape_id(&self) -> u8 {
        match self.shape {
            Shape::Rectangle(_) => SHAPE_RECTANGLE,
            Shape::Circle(_) => SHAPE_CIRCLE,
            Shape::Robot(_) => SHAPE_KHEPERA_ROBOT,
        }
    }

    pub fn is_robot(&self) -> bool {
        matches!(self.shape, Shape::Robot(_))
    }

    /// Moves the entity by the given delta. Silent no-op on immovable
    /// entities.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        if !self.movable {
            return;
        }
        match &mut self.shape {
            Shape::Rectangle(rect) => rect.bottom_left.translate(dx, dy),
            Shape::Circle(circle) => circle.center.translate(dx, dy),
            Shape::Robot(robot) => robot.center.translate(dx, dy),
        }
    }

    /// The point collision resolution displaces along: rectangle
    /// center or disc center.
    pub fn reference_point(&self) -> Point {
        match &self.shape {
            Shape::Rectangle(rect) => rect.center(),
            Shape::Circle(circle) => circle.center,
            Shape::Robot(robot) => robot.center,
        }
    }

    /// Writes the snapshot wire record:
    /// `shape_id | id | movable | weight | shape payload`.
    /// Rectangles ship their four derived corners, discs their center
    /// and radius.
    pub fn serialize(&self, writer: &mut WireWriter) {
        self.write_header(writer);
        match &self.shape {
            Shape::Rectangle(rect) => {
                for corner in rect.corners() {
                    writer.put_f64(corner.x);
                    writer.put_f64(corner.y);
                }
            }
            Shape::Circle(circle) => {
                writer.put_f64(circle.center.x);
                writer.put_f64(circle.center.y);
                writer.put_f64(circle.radius);
            }
            Shape::Robot(robot) => {
                writer.put_f64(robot.center.x);
                writer.put_f64(robot.center.y);
                writer.put_f64(robot.radius);
            }
        }
    }

    fn write_header(&self, writer: &mut WireWriter) {
        writer.put_u8(self.shape_id());
        writer.put_u16(self.id);
        writer.put_u8(self.movable as u8);
        writer.put_u32(self.weight);
    }

    /// Writes the world-file record. Unlike the wire form this stores
    /// the raw geometry fields so width/height/angle/radius round-trip
    /// without precision loss. Motor speeds are transient and not
    /// persisted.
    pub fn write_record(&self, writer: &mut WireWriter) {
        self.write_header(writer);
        match &self.shape {
            Shape::Rectangle(rect) => {
                writer.put_f64(rect.bottom_left.x);
                writer.put_f64(rect.bottom_left.y);
                writer.put_f64(rect.width);
                writer.put_f64(rect.height);
                writer.put_f64(rect.angle);
            }
            Shape::Circle(circle) => {
                writer.put_f64(circle.center.x);
                writer.put_f64(circle.center.y);
                writer.put_f64(circle.radius);
            }
            Shape::Robot(robot) => {
                writer.put_f64(robot.center.x);
                writer.put_f64(robot.center.y);
                writer.put_f64(robot.radius);
                writer.put_f64(robot.heading);
            }
        }
    }

    /// Reads back a record written by [`Entity::write_record`].
    pub fn read_record(reader: &mut WireReader) -> Result<Entity, WireError> {
        let shape_id = reader.take_u8()?;
        let id = reader.take_u16()?;
        let movable = reader.take_u8()? != 0;
        let weight = reader.take_u32()?;

        let shape = match shape_id {
            SHAPE_RECTANGLE => {
                let x = reader.take_f64()?;
                let y = reader.take_f64()?;
                let width = reader.take_f64()?;
                let height = reader.take_f64()?;
                let angle = reader.take_f64()?;
                Shape::Rectangle(Rectangle::new(Point::new(x, y), width, height, angle))
            }
            SHAPE_CIRCLE => {
                let x = reader.take_f64()?;
                let y = reader.take_f64()?;
                let radius = reader.take_f64()?;
                Shape::Circle(Circle::new(Point::new(x, y), radius))
            }
            SHAPE_KHEPERA_ROBOT => {
                let x = reader.take_f64()?;
                let y = reader.take_f64()?;
                let radius = reader.take_f64()?;
                let heading = reader.take_f64()?;
                Shape::Robot(Robot::new(Point::new(x, y), radius, heading))
            }
            other => {
                return Err(WireError::Malformed(format!("unknown shape id {}", other)));
            }
        };

        Ok(Entity::new(id, weight, movable, shape))
    }

    /// Appends the whitespace-delimited textual form of the record.
    pub fn write_text(&self, out: &mut String) {
        use std::fmt::Write;

        let _ = write!(
            out,
            "{} {} {} {}",
            self.shape_id(),
            self.id,
            self.movable as u8,
            self.weight
        );
        match &self.shape {
            Shape::Rectangle(rect) => {
                let _ = write!(
                    out,
                    " {} {} {} {} {}",
                    rect.bottom_left.x, rect.bottom_left.y, rect.width, rect.height, rect.angle
                );
            }
            Shape::Circle(circle) => {
                let _ = write!(out, " {} {} {}", circle.center.x, circle.center.y, circle.radius);
            }
            Shape::Robot(robot) => {
                let _ = write!(
                    out,
                    " {} {} {} {}",
                    robot.center.x, robot.center.y, robot.radius, robot.heading
                );
            }
        }
        out.push('\n');
    }

    /// Parses the textual form from a whitespace token stream.
    pub fn read_text<'a, I>(tokens: &mut I) -> Result<Entity, WireError>
    where
        I: Iterator<Item = &'a str>,
    {
        let shape_id: u8 = next_field(tokens)?;
        let id: u16 = next_field(tokens)?;
        let movable = next_field::<u8, _>(tokens)? != 0;
        let weight: u32 = next_field(tokens)?;

        let shape = match shape_id {
            SHAPE_RECTANGLE => {
                let x: f64 = next_field(tokens)?;
                let y: f64 = next_field(tokens)?;
                let width: f64 = next_field(tokens)?;
                let height: f64 = next_field(tokens)?;
                let angle: f64 = next_field(tokens)?;
                Shape::Rectangle(Rectangle::new(Point::new(x, y), width, height, angle))
            }
            SHAPE_CIRCLE => {
                let x: f64 = next_field(tokens)?;
                let y: f64 = next_field(tokens)?;
                let radius: f64 = next_field(tokens)?;
                Shape::Circle(Circle::new(Point::new(x, y), radius))
            }
            SHAPE_KHEPERA_ROBOT => {
                let x: f64 = next_field(tokens)?;
                let y: f64 = next_field(tokens)?;
                let radius: f64 = next_field(tokens)?;
                let heading: f64 = next_field(tokens)?;
                Shape::Robot(Robot::new(Point::new(x, y), radius, heading))
            }
            other => {
                return Err(WireError::Malformed(format!("unknown shape id {}", other)));
            }
        };

        Ok(Entity::new(id, weight, movable, shape))
    }
}

/// Pulls and parses the next whitespace token.
pub(crate) fn next_field<'a, T, I>(tokens: &mut I) -> Result<T, WireError>
where
    T: std::str::FromStr,
    I: Iterator<Item = &'a str>,
{
    let token = tokens
        .next()
        .ok_or_else(|| WireError::Malformed("unexpected end of text record".to_string()))?;
    token
        .parse()
        .map_err(|_| WireError::Malformed(format!("unparsable field '{}'", token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_rectangle_corners_unrotated() {
        let rect = Rectangle::new(Point::new(10.0, 20.0), 4.0, 2.0, 0.0);
        let [bl, tl, tr, br] = rect.corners();

        assert_eq!(bl, Point::new(10.0, 20.0));
        assert_approx_eq!(tl.x, 10.0);
        assert_approx_eq!(tl.y, 22.0);
        assert_approx_eq!(tr.x, 14.0);
        assert_approx_eq!(tr.y, 22.0);
        assert_approx_eq!(br.x, 14.0);
        assert_approx_eq!(br.y, 20.0);
    }

    #[test]
    fn test_rectangle_center_is_corner_average() {
        let rect = Rectangle::new(Point::new(1.0, -2.0), 6.0, 3.0, 0.7);
        let corners = rect.corners();
        let avg_x = corners.iter().map(|c| c.x).sum::<f64>() / 4.0;
        let avg_y = corners.iter().map(|c| c.y).sum::<f64>() / 4.0;

        let center = rect.center();
        assert_approx_eq!(center.x, avg_x);
        assert_approx_eq!(center.y, avg_y);
    }

    #[test]
    fn test_immovable_entity_ignores_translate() {
        let mut wall = Entity::new(
            1,
            100,
            false,
            Shape::Rectangle(Rectangle::new(Point::new(0.0, 0.0), 10.0, 1.0, 0.0)),
        );
        wall.translate(5.0, 5.0);

        match wall.shape() {
            Shape::Rectangle(rect) => assert_eq!(rect.bottom_left, Point::new(0.0, 0.0)),
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn test_movable_entity_translates() {
        let mut ball = Entity::new(2, 5, true, Shape::Circle(Circle::new(Point::new(1.0, 1.0), 2.0)));
        ball.translate(-0.5, 2.5);

        match ball.shape() {
            Shape::Circle(circle) => {
                assert_approx_eq!(circle.center.x, 0.5);
                assert_approx_eq!(circle.center.y, 3.5);
            }
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn test_wire_record_rectangle_layout() {
        let rect = Rectangle::new(Point::new(3.0, 4.0), 2.0, 1.0, 0.0);
        let entity = Entity::new(9, 42, true, Shape::Rectangle(rect));

        let mut writer = WireWriter::new();
        entity.serialize(&mut writer);
        let bytes = writer.into_bytes();

        // header (8 bytes) + four corner points (64 bytes)
        assert_eq!(bytes.len(), 8 + 64);

        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.take_u8().unwrap(), SHAPE_RECTANGLE);
        assert_eq!(reader.take_u16().unwrap(), 9);
        assert_eq!(reader.take_u8().unwrap(), 1);
        assert_eq!(reader.take_u32().unwrap(), 42);

        let expected = rect.corners();
        for corner in expected {
            assert_eq!(reader.take_f64().unwrap(), corner.x);
            assert_eq!(reader.take_f64().unwrap(), corner.y);
        }
    }

    #[test]
    fn test_wire_record_corners_match_direct_computation() {
        // Serialization is a pure function of entity state: serialized
        // corners equal corners recomputed from the same inputs.
        let rect = Rectangle::new(Point::new(-1.5, 2.25), 3.0, 7.0, 1.1);
        let entity = Entity::new(4, 7, false, Shape::Rectangle(rect));

        let mut writer = WireWriter::new();
        entity.serialize(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes[8..]);

        for corner in Rectangle::new(Point::new(-1.5, 2.25), 3.0, 7.0, 1.1).corners() {
            assert_eq!(reader.take_f64().unwrap(), corner.x);
            assert_eq!(reader.take_f64().unwrap(), corner.y);
        }
    }

    #[test]
    fn test_file_record_roundtrip_binary() {
        let original = Entity::new(
            3,
            15,
            true,
            Shape::Rectangle(Rectangle::new(Point::new(0.125, -9.5), 12.75, 3.5, 0.375)),
        );

        let mut writer = WireWriter::new();
        original.write_record(&mut writer);
        let bytes = writer.into_bytes();

        let mut reader = WireReader::new(&bytes);
        let restored = Entity::read_record(&mut reader).unwrap();
        assert_eq!(restored, original);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_file_record_roundtrip_text() {
        let original = Entity::new(
            7,
            10,
            true,
            Shape::Robot(Robot::new(Point::new(100.0, 250.5), 26.0, 1.5707963267948966)),
        );

        let mut text = String::new();
        original.write_text(&mut text);

        let mut tokens = text.split_whitespace();
        let restored = Entity::read_text(&mut tokens).unwrap();
        assert_eq!(restored, original);
        assert!(tokens.next().is_none());
    }

    #[test]
    fn test_read_record_rejects_unknown_shape() {
        let mut writer = WireWriter::new();
        writer.put_u8(99);
        writer.put_u16(1);
        writer.put_u8(0);
        writer.put_u32(1);

        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes);
        assert!(Entity::read_record(&mut reader).is_err());
    }
}
