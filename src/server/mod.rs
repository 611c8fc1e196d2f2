pub mod handlers;
pub mod router;

pub use router::{HubState, hub_router};
