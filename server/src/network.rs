//! Network front-end: TCP listener, admission handshake and the
//! single coordinating event loop.
//!
//! Per-connection reader and writer tasks do all socket I/O and talk
//! to the event loop over channels, so nothing blocks on a slow
//! client and the gate is only ever taken for synchronous, bounded
//! work (command execution; admission lookups). Broadcast bytes are
//! serialized by the step loop and fanned out here after the gate has
//! been released.

use crate::client_manager::{ClientHandle, ClientManager};
use crate::commands;
use crate::engine::StepBroadcast;
use crate::gate::Gate;
use crate::simulation::Simulation;
use log::{debug, error, info, warn};
use shared::{CLIENT_TYPE_CONTROLLER, CLIENT_TYPE_VISUALISER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Events flowing from connection tasks into the event loop.
#[derive(Debug)]
pub enum ServerMessage {
    NewVisualiser {
        stream: TcpStream,
        addr: SocketAddr,
    },
    NewController {
        robot_id: u16,
        stream: TcpStream,
        addr: SocketAddr,
    },
    ControllerCommand {
        robot_id: u16,
        command_id: u8,
        payload: Vec<u8>,
    },
    VisualiserClosed {
        conn_id: u64,
    },
    ControllerClosed {
        robot_id: u16,
    },
}

/// The network server: owns the listener, the client registries and
/// the receiving ends of the event and broadcast channels.
pub struct Server {
    listener: TcpListener,
    gate: Arc<Gate<Simulation>>,
    clients: ClientManager,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    updates_rx: mpsc::UnboundedReceiver<StepBroadcast>,
    updates_open: bool,
}

impl Server {
    /// Binds the listen socket. A bind/listen failure here is fatal
    /// for the process; the simulation is not started on top of a
    /// dead socket.
    pub async fn bind(
        addr: &str,
        gate: Arc<Gate<Simulation>>,
        updates_rx: mpsc::UnboundedReceiver<StepBroadcast>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            gate,
            clients: ClientManager::new(),
            server_tx,
            server_rx,
            updates_rx,
            updates_open: true,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The event loop: accepts connections, applies client events and
    /// fans out post-step broadcasts.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Server listening on {}", self.listener.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_handshake(stream, addr),
                        Err(e) => error!("Accept failed: {}", e),
                    }
                },

                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message),
                        // Unreachable while we hold a sender clone.
                        None => break,
                    }
                },

                update = self.updates_rx.recv(), if self.updates_open => {
                    match update {
                        Some(update) => self.broadcast(update),
                        None => {
                            debug!("Step loop gone; broadcasts stopped");
                            self.updates_open = false;
                        }
                    }
                },
            }
        }

        Ok(())
    }

    /// Reads the admission handshake off the event loop: client type
    /// tag, then the target robot id for controllers.
    fn spawn_handshake(&self, mut stream: TcpStream, addr: SocketAddr) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut tag = [0u8; 1];
            if stream.read_exact(&mut tag).await.is_err() {
                debug!("Handshake from {} aborted", addr);
                return;
            }

            match tag[0] {
                CLIENT_TYPE_VISUALISER => {
                    let _ = server_tx.send(ServerMessage::NewVisualiser { stream, addr });
                }
                CLIENT_TYPE_CONTROLLER => {
                    let mut id_buf = [0u8; 2];
                    if stream.read_exact(&mut id_buf).await.is_err() {
                        debug!("Controller handshake from {} aborted", addr);
                        return;
                    }
                    let robot_id = u16::from_be_bytes(id_buf);
                    let _ = server_tx.send(ServerMessage::NewController {
                        robot_id,
                        stream,
                        addr,
                    });
                }
                other => {
                    // Closes the connection by dropping the stream.
                    warn!("Unknown client type tag {} from {}", other, addr);
                }
            }
        });
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::NewVisualiser { stream, addr } => {
                self.register_visualiser(stream, addr);
            }

            ServerMessage::NewController { robot_id, stream, addr } => {
                self.register_controller(robot_id, stream, addr);
            }

            ServerMessage::ControllerCommand {
                robot_id,
                command_id,
                payload,
            } => {
                let mut sim = self.gate.lock();
                commands::execute(&mut sim, robot_id, command_id, &payload);
            }

            ServerMessage::VisualiserClosed { conn_id } => {
                self.clients.remove_visualiser(conn_id);
            }

            ServerMessage::ControllerClosed { robot_id } => {
                self.clients.remove_controller(robot_id);
            }
        }
    }

    fn register_visualiser(&mut self, stream: TcpStream, addr: SocketAddr) {
        let (mut read_half, write_half) = stream.into_split();
        let (sender, receiver) = mpsc::unbounded_channel();
        let conn_id = self.clients.add_visualiser(ClientHandle { addr, sender });

        spawn_writer(write_half, receiver);

        let server_tx = self.server_tx.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                match read_half.read(&mut buf).await {
                    // Zero-length read means the peer closed.
                    Ok(0) | Err(_) => {
                        let _ = server_tx.send(ServerMessage::VisualiserClosed { conn_id });
                        break;
                    }
                    Ok(n) => debug!("Ignoring {} bytes from visualiser {}", n, conn_id),
                }
            }
        });
    }

    fn register_controller(&mut self, robot_id: u16, stream: TcpStream, addr: SocketAddr) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = ClientHandle { addr, sender };

        let admitted = {
            let sim = self.gate.lock();
            self.clients.admit_controller(robot_id, &sim, handle)
        };
        if let Err(reason) = admitted {
            // Dropping the stream closes the connection.
            warn!("Rejecting controller from {}: {}", addr, reason);
            return;
        }

        let (mut read_half, write_half) = stream.into_split();
        spawn_writer(write_half, receiver);

        let server_tx = self.server_tx.clone();
        tokio::spawn(async move {
            let mut id_buf = [0u8; 1];
            loop {
                if read_half.read_exact(&mut id_buf).await.is_err() {
                    let _ = server_tx.send(ServerMessage::ControllerClosed { robot_id });
                    break;
                }

                let command_id = id_buf[0];
                match commands::lookup(command_id) {
                    Some(descriptor) => {
                        let mut payload = vec![0u8; descriptor.payload_len];
                        if read_half.read_exact(&mut payload).await.is_err() {
                            let _ = server_tx.send(ServerMessage::ControllerClosed { robot_id });
                            break;
                        }
                        let _ = server_tx.send(ServerMessage::ControllerCommand {
                            robot_id,
                            command_id,
                            payload,
                        });
                    }
                    None => {
                        // Silently dropped; the protocol has no error
                        // reply channel.
                        warn!(
                            "Unknown command id {} from controller of robot {}",
                            command_id, robot_id
                        );
                    }
                }
            }
        });
    }

    /// Fans one post-step broadcast out to every visualiser and each
    /// robot's controller, if attached.
    fn broadcast(&mut self, update: StepBroadcast) {
        for (conn_id, handle) in self.clients.visualiser_handles() {
            if handle.sender.send(update.snapshot.clone()).is_err() {
                debug!("Visualiser {} writer already gone", conn_id);
            }
        }
        for (robot_id, bytes) in update.robot_states {
            if let Some(handle) = self.clients.controller_handle(robot_id) {
                let _ = handle.sender.send(bytes);
            }
        }
    }
}

/// Writer task for one connection: drains the client's outbound queue
/// onto the socket. Exits when the queue closes (client removed) or
/// the socket dies; either way the write half drops and the socket
/// closes.
fn spawn_writer(mut write_half: OwnedWriteHalf, mut receiver: mpsc::UnboundedReceiver<Vec<u8>>) {
    tokio::spawn(async move {
        while let Some(bytes) = receiver.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });
}
