pub mod handlers;
mod preview;
pub mod response;
mod routes;

pub use routes::create_router;
