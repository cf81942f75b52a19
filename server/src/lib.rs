//! # Khepera Simulation Server
//!
//! Authoritative physics simulation for small wheeled robots moving
//! among static and movable shapes in a bounded 2-D world. Controller
//! clients drive individual robots over TCP; visualiser clients
//! receive periodic binary broadcasts of the full world state.
//!
//! ## Architecture
//!
//! Two loops share one piece of mutable state, the entity set:
//!
//! - The **step loop** ([`engine`]) advances physics on a fixed
//!   timestep: apply robot motion, run a few detect-and-separate
//!   relaxation passes ([`collision`], [`simulation`]), advance the
//!   time counter, then serialize the post-step snapshot.
//! - The **event loop** ([`network`]) accepts clients, executes
//!   controller commands ([`commands`]) and fans broadcast bytes out
//!   to per-connection writer tasks.
//!
//! Both go through the [`gate`]: a non-reentrant lock that is only
//! ever held for synchronous, bounded, CPU-only work. Socket I/O
//! happens strictly outside the critical section, so a slow client
//! can never stall the step cadence.
//!
//! ## Protocol
//!
//! The wire formats live in the `shared` crate: fixed binary entity
//! records (integers network byte order, floats host byte order), a
//! one-byte admission handshake, and fixed-size controller commands.
//! Unknown or malformed commands are dropped without a reply.

pub mod client_manager;
pub mod collision;
pub mod commands;
pub mod engine;
pub mod entity;
pub mod gate;
pub mod network;
pub mod simulation;
