//! Replication demo: one authoritative server and several clients stepped in
//! a single process over the loopback transport.
//!
//! The server spawns three grey level objects, gives every joining player a
//! green object that wanders the arena, and replicates the lot each tick.
//! Clients mirror the server's objects from the messages they receive.

pub mod client;
pub mod game;
pub mod rng;
pub mod server;
pub mod sim;

pub use client::{ClientSim, ClientTick};
pub use game::GameObject;
pub use server::{SentMessage, ServerSim, ServerTick};
pub use sim::{run, SimConfig, Simulation, Summary};
