//! Controller command dispatch.
//!
//! Commands are stateless descriptors in a fixed table indexed by the
//! wire command id, set up once at startup. Each descriptor knows its
//! payload length (so the network layer can frame the stream) and how
//! to apply the payload to the targeted robot. Unknown ids and
//! payloads targeting non-robot entities are dropped silently; no
//! error code goes back to the sender.

use crate::entity::{Robot, Shape};
use crate::simulation::Simulation;
use log::debug;
use shared::{
    WireError, WireReader, CMD_MOTORS_SPEED_CHANGE, CMD_SINGLE_MOTOR_SPEED_CHANGE, MOTOR_LEFT,
    MOTOR_RIGHT,
};

/// A stateless controller command.
pub struct CommandDescriptor {
    pub id: u8,
    /// Fixed payload size following the command id byte.
    pub payload_len: usize,
    apply: fn(&mut Robot, &[u8]) -> Result<(), WireError>,
}

/// All valid controller commands, indexed by command id.
pub const COMMAND_TABLE: [CommandDescriptor; 2] = [
    CommandDescriptor {
        id: CMD_SINGLE_MOTOR_SPEED_CHANGE,
        payload_len: 9, // motor selector + speed
        apply: apply_single_motor_speed,
    },
    CommandDescriptor {
        id: CMD_MOTORS_SPEED_CHANGE,
        payload_len: 16, // left speed + right speed
        apply: apply_motors_speed,
    },
];

/// Looks up a command descriptor by wire id.
pub fn lookup(command_id: u8) -> Option<&'static CommandDescriptor> {
    COMMAND_TABLE
        .iter()
        .find(|descriptor| descriptor.id == command_id)
}

/// Executes a decoded command against the targeted robot. Missing
/// entities, non-robot targets, unknown ids and short payloads are
/// all dropped without touching the world.
pub fn execute(simulation: &mut Simulation, robot_id: u16, command_id: u8, payload: &[u8]) {
    let Some(descriptor) = lookup(command_id) else {
        debug!("Dropping unknown command id {}", command_id);
        return;
    };
    if payload.len() != descriptor.payload_len {
        debug!(
            "Dropping command {}: payload {} bytes, expected {}",
            command_id,
            payload.len(),
            descriptor.payload_len
        );
        return;
    }

    let Some(entity) = simulation.get_entity_mut(robot_id) else {
        debug!("Dropping command {}: no entity {}", command_id, robot_id);
        return;
    };
    let Shape::Robot(robot) = entity.shape_mut() else {
        debug!("Dropping command {}: entity {} is not a robot", command_id, robot_id);
        return;
    };

    if let Err(err) = (descriptor.apply)(robot, payload) {
        debug!("Dropping malformed command {}: {}", command_id, err);
    }
}

fn apply_single_motor_speed(robot: &mut Robot, payload: &[u8]) -> Result<(), WireError> {
    let mut reader = WireReader::new(payload);
    let motor = reader.take_u8()?;
    let speed = reader.take_f64()?;

    match motor {
        MOTOR_LEFT => robot.left_speed = speed,
        MOTOR_RIGHT => robot.right_speed = speed,
        other => debug!("Ignoring unknown motor selector {}", other),
    }
    Ok(())
}

fn apply_motors_speed(robot: &mut Robot, payload: &[u8]) -> Result<(), WireError> {
    let mut reader = WireReader::new(payload);
    robot.left_speed = reader.take_f64()?;
    robot.right_speed = reader.take_f64()?;
    Ok(())
}
