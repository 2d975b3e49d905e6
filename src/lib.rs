//! Remote-control console for a robot: samples a gamepad into control
//! snapshots and streams microphone audio, both over one MQTT link.

pub mod audio;
pub mod config;
pub mod console;
pub mod controller;
pub mod link;
pub mod mapping;
