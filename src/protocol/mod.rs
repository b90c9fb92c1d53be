//! Protocol module - the edge-server handler wire format.
//!
//! Inbound (edge server → handler), one frame per transport message:
//! ```text
//! <serverId> <clientId> <path> <headerLen>:<headerJson>,<bodyLen>:<body>,
//! ```
//!
//! Outbound (handler → edge server):
//! ```text
//! <serverId> <len(clientList)>:<clientList>, HTTP/1.1 <code> <msg>\r\n<headers>\r\n<body>
//! ```
//!
//! The outer envelope only addresses client connections on an edge server;
//! the HTTP-shaped payload after it is forwarded to every addressed client
//! unmodified.

mod request;
mod response;

pub use request::{build_request_frame, decode_request, Request};
pub use response::{encode_response, Response, MAX_CLIENTS_PER_FRAME};
