//! Client registries and controller admission.
//!
//! Two client roles exist: visualisers passively receive world
//! snapshots; controllers drive exactly one robot each. Admission of
//! a controller is checked against the live entity set: the target id
//! must reference a robot and must not already have a controller.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::simulation::Simulation;

/// Why a controller handshake was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("no entity with id {0}")]
    UnknownEntity(u16),
    #[error("entity {0} is not a robot")]
    NotARobot(u16),
    #[error("robot {0} already has a controller")]
    AlreadyControlled(u16),
}

/// Outbound handle for one connected client; bytes pushed here are
/// written to the socket by the connection's writer task.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub addr: SocketAddr,
    pub sender: mpsc::UnboundedSender<Vec<u8>>,
}

/// Tracks connected visualisers (by connection id) and controllers
/// (by the robot id they target).
#[derive(Debug, Default)]
pub struct ClientManager {
    visualisers: HashMap<u64, ClientHandle>,
    controllers: HashMap<u16, ClientHandle>,
    next_visualiser_id: u64,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a visualiser and returns its connection id.
    pub fn add_visualiser(&mut self, handle: ClientHandle) -> u64 {
        let conn_id = self.next_visualiser_id;
        self.next_visualiser_id += 1;
        info!("Visualiser {} connected from {}", conn_id, handle.addr);
        self.visualisers.insert(conn_id, handle);
        conn_id
    }

    /// Removes a visualiser. Returns false if it was already gone.
    pub fn remove_visualiser(&mut self, conn_id: u64) -> bool {
        if self.visualisers.remove(&conn_id).is_some() {
            info!("Visualiser {} disconnected", conn_id);
            true
        } else {
            false
        }
    }

    /// Admits a controller for `robot_id` if the target is a live
    /// robot with no controller attached.
    pub fn admit_controller(
        &mut self,
        robot_id: u16,
        simulation: &Simulation,
        handle: ClientHandle,
    ) -> Result<(), AdmissionError> {
        check_controller_target(robot_id, simulation)?;
        if self.controllers.contains_key(&robot_id) {
            return Err(AdmissionError::AlreadyControlled(robot_id));
        }
        info!("Controller for robot {} connected from {}", robot_id, handle.addr);
        self.controllers.insert(robot_id, handle);
        Ok(())
    }

    /// Removes a controller. Returns false if it was already gone.
    pub fn remove_controller(&mut self, robot_id: u16) -> bool {
        if self.controllers.remove(&robot_id).is_some() {
            info!("Controller for robot {} disconnected", robot_id);
            true
        } else {
            false
        }
    }

    pub fn visualiser_handles(&self) -> impl Iterator<Item = (u64, &ClientHandle)> {
        self.visualisers.iter().map(|(id, handle)| (*id, handle))
    }

    pub fn controller_handle(&self, robot_id: u16) -> Option<&ClientHandle> {
        self.controllers.get(&robot_id)
    }

    pub fn visualiser_count(&self) -> usize {
        self.visualisers.len()
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }
}

/// The entity-set half of the admission check: the id must reference
/// a live robot.
pub fn check_controller_target(
    robot_id: u16,
    simulation: &Simulation,
) -> Result<(), AdmissionError> {
    match simulation.get_entity(robot_id) {
        None => Err(AdmissionError::UnknownEntity(robot_id)),
        Some(entity) if !entity.is_robot() => Err(AdmissionError::NotARobot(robot_id)),
        Some(_) => Ok(()),
    }
}
