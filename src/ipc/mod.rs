//! IPC server for application instances

pub mod protocol;
pub mod server;

pub use protocol::{
    parse_command, serialize_event, serialize_response, Command, Event, Response, PROTOCOL_VERSION,
    SOCKET_PATH,
};
pub use server::IpcServer;
