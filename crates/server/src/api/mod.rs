pub mod audit;
pub mod clips;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod videos;
pub mod ws;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
pub use ws::{WsBroadcaster, WsMessage};
