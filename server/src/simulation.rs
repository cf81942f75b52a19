//! The simulation: owns the entity set, world bounds and the
//! fixed-step update. A step applies robot motion, then runs a small
//! number of detect-and-separate relaxation passes so chained
//! penetrations converge, then advances the elapsed-time counter.

use crate::collision::pair_collision_length;
use crate::entity::{next_field, Entity, Shape};
use log::{debug, info};
use shared::{WireError, WireReader, WireWriter, EPS, NUMBER_OF_CHECKS};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("duplicate entity id {0}")]
    DuplicateId(u16),
    #[error("entity set is full ({0} entities)")]
    EntityLimit(usize),
    #[error("world file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("world file decode: {0}")]
    Decode(#[from] WireError),
}

/// The world: entities keyed by id, fixed bounds, elapsed time.
#[derive(Debug, Clone)]
pub struct Simulation {
    entities: BTreeMap<u16, Entity>,
    world_width: u32,
    world_height: u32,
    time: f64,
}

impl Simulation {
    pub fn new(world_width: u32, world_height: u32) -> Self {
        Self {
            entities: BTreeMap::new(),
            world_width,
            world_height,
            time: 0.0,
        }
    }

    pub fn world_width(&self) -> u32 {
        self.world_width
    }

    pub fn world_height(&self) -> u32 {
        self.world_height
    }

    /// Elapsed simulated time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Adds an entity before the simulation starts running. Ids are
    /// unique across the live set; live removal is not supported. The
    /// set is capped so the snapshot entity count always fits in its
    /// `u16` wire field.
    pub fn add_entity(&mut self, entity: Entity) -> Result<(), SimulationError> {
        let id = entity.id();
        if self.entities.contains_key(&id) {
            return Err(SimulationError::DuplicateId(id));
        }
        if self.entities.len() >= usize::from(u16::MAX) {
            return Err(SimulationError::EntityLimit(self.entities.len()));
        }
        info!("Added entity {} (shape id {})", id, entity.shape_id());
        self.entities.insert(id, entity);
        Ok(())
    }

    pub fn get_entity(&self, id: u16) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_entity_mut(&mut self, id: u16) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// One atomic simulation step. Motion happens before detection,
    /// detection before resolution, resolution before the time
    /// counter advances.
    pub fn update(&mut self, dt: f64) {
        self.apply_motion(dt);
        for _ in 0..NUMBER_OF_CHECKS {
            self.check_collisions();
        }
        self.time += dt;
    }

    /// Integrates robot wheel speeds into translations. Differential
    /// drive: the wheel average moves the robot along its heading,
    /// the wheel difference turns it about its center.
    fn apply_motion(&mut self, dt: f64) {
        let width = self.world_width as f64;
        let height = self.world_height as f64;

        for entity in self.entities.values_mut() {
            if !entity.movable() {
                continue;
            }
            if let Shape::Robot(robot) = entity.shape_mut() {
                let linear = 0.5 * (robot.left_speed + robot.right_speed) * dt;
                let angular = (robot.right_speed - robot.left_speed) / (2.0 * robot.radius) * dt;
                robot.heading += angular;

                robot
                    .center
                    .translate(linear * robot.heading.cos(), linear * robot.heading.sin());
                // A robot wider than the world has no valid clamp
                // range on that axis; leave the coordinate alone.
                if 2.0 * robot.radius <= width {
                    robot.center.x = robot.center.x.clamp(robot.radius, width - robot.radius);
                }
                if 2.0 * robot.radius <= height {
                    robot.center.y = robot.center.y.clamp(robot.radius, height - robot.radius);
                }
            }
        }
    }

    /// One relaxation pass: estimate every pair with at least one
    /// movable member and separate those that overlap.
    pub fn check_collisions(&mut self) {
        let ids: Vec<u16> = self.entities.keys().copied().collect();

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (id_a, id_b) = (ids[i], ids[j]);
                let (a, b) = (&self.entities[&id_a], &self.entities[&id_b]);
                if !a.movable() && !b.movable() {
                    continue;
                }

                let depth = pair_collision_length(a, b);
                if depth > EPS {
                    self.separate_pair(id_a, id_b, depth);
                }
            }
        }
    }

    /// Displaces an overlapping pair along the line connecting their
    /// reference points, splitting the depth in inverse proportion to
    /// weight. An immovable partner absorbs nothing.
    fn separate_pair(&mut self, id_a: u16, id_b: u16, depth: f64) {
        let a = &self.entities[&id_a];
        let b = &self.entities[&id_b];
        let pa = a.reference_point();
        let pb = b.reference_point();

        let dist = pa.distance(&pb);
        let (nx, ny) = if dist < EPS {
            // Coincident reference points: pick a fixed axis.
            (1.0, 0.0)
        } else {
            ((pb.x - pa.x) / dist, (pb.y - pa.y) / dist)
        };

        let (share_a, share_b) = match (a.movable(), b.movable()) {
            (true, true) => {
                let total = (a.weight() + b.weight()) as f64;
                (
                    depth * b.weight() as f64 / total,
                    depth * a.weight() as f64 / total,
                )
            }
            (true, false) => (depth, 0.0),
            (false, true) => (0.0, depth),
            (false, false) => return,
        };

        debug!(
            "Separating {} and {}: depth {:.4}, shares {:.4}/{:.4}",
            id_a, id_b, depth, share_a, share_b
        );
        if let Some(entity) = self.entities.get_mut(&id_a) {
            entity.translate(-nx * share_a, -ny * share_a);
        }
        if let Some(entity) = self.entities.get_mut(&id_b) {
            entity.translate(nx * share_b, ny * share_b);
        }
    }

    /// Serializes the full world state for visualisers: world bounds,
    /// entity count, then one record per entity in ascending id order.
    pub fn serialize_snapshot(&self, writer: &mut WireWriter) {
        writer.put_u32(self.world_width);
        writer.put_u32(self.world_height);
        writer.put_u16(self.entities.len() as u16);
        for entity in self.entities.values() {
            entity.serialize(writer);
        }
    }

    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        self.serialize_snapshot(&mut writer);
        writer.into_bytes()
    }

    /// The feedback record sent to a robot's controller: the robot's
    /// own snapshot record.
    pub fn robot_state_bytes(&self, id: u16) -> Option<Vec<u8>> {
        let entity = self.entities.get(&id)?;
        if !entity.is_robot() {
            return None;
        }
        let mut writer = WireWriter::new();
        entity.serialize(&mut writer);
        Some(writer.into_bytes())
    }

    /// Feedback records for every robot in the world; the network
    /// layer forwards each to its controller, if one is attached.
    pub fn robot_states(&self) -> Vec<(u16, Vec<u8>)> {
        self.entities
            .values()
            .filter(|entity| entity.is_robot())
            .map(|entity| {
                let mut writer = WireWriter::new();
                entity.serialize(&mut writer);
                (entity.id(), writer.into_bytes())
            })
            .collect()
    }

    /// Saves the world to a file, binary or whitespace-delimited text.
    pub fn save(&self, path: &Path, binary: bool) -> Result<(), SimulationError> {
        if binary {
            let mut writer = WireWriter::new();
            writer.put_u32(self.world_width);
            writer.put_u32(self.world_height);
            for entity in self.entities.values() {
                entity.write_record(&mut writer);
            }
            fs::write(path, writer.as_bytes())?;
        } else {
            let mut text = format!("{} {}\n", self.world_width, self.world_height);
            for entity in self.entities.values() {
                entity.write_text(&mut text);
            }
            fs::write(path, text)?;
        }
        info!("Saved world ({} entities) to {}", self.entities.len(), path.display());
        Ok(())
    }

    /// Loads a world saved by [`Simulation::save`]. The entity set is
    /// populated atomically; a decode error loses the whole load.
    pub fn load(path: &Path, binary: bool) -> Result<Self, SimulationError> {
        let simulation = if binary {
            let bytes = fs::read(path)?;
            let mut reader = WireReader::new(&bytes);
            let mut simulation = Simulation::new(reader.take_u32()?, reader.take_u32()?);
            while reader.remaining() > 0 {
                simulation.add_entity(Entity::read_record(&mut reader)?)?;
            }
            simulation
        } else {
            let text = fs::read_to_string(path)?;
            let mut tokens = text.split_whitespace().peekable();
            let width = next_field(&mut tokens)?;
            let height = next_field(&mut tokens)?;
            let mut simulation = Simulation::new(width, height);
            while tokens.peek().is_some() {
                simulation.add_entity(Entity::read_text(&mut tokens)?)?;
            }
            simulation
        };
        info!(
            "Loaded world {}x{} with {} entities from {}",
            simulation.world_width,
            simulation.world_height,
            simulation.entities.len(),
            path.display()
        );
        Ok(simulation)
    }
}
