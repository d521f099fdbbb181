//! Turns queued shapes into paced angle commands for the drawing bot, and
//! delivers them through the serial bridge.
//!
//! A run goes through [`session::DrawingBot`]: the shapes are sampled by the
//! planner, each point is solved for actuator angles, and the encoded commands
//! are collected in a [`stream::Outbox`]. Only once all of that has worked do
//! we connect to the bridge and send them.

pub mod connection;
pub mod drawings;
pub mod preview;
pub mod session;
pub mod settings;
pub mod stream;
pub mod supervisor;
