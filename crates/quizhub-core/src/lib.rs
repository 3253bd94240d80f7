//! Room model, wire messages, and codec shared by the quizhub server and
//! its clients.

pub mod code;
pub mod net;
pub mod player;
pub mod room;
pub mod team;
pub mod time;
