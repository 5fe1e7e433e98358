//! cmsrelay HTTP surface: router, shared state and error mapping.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
