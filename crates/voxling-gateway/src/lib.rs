//! WebSocket session gateway — connection manager, turn orchestrator,
//! and the companion static file service.

pub mod connection;
pub mod files;
pub mod pipeline;
pub mod server;
pub mod state;

pub use files::start_file_server;
pub use server::start_gateway;
pub use state::{ConnectionState, GatewayState};
