//! Shared application state for the thin HTTP layer, grounded in the
//! teacher's `api::AppState`: a small `Clone` struct of `Arc`-wrapped
//! services that handlers borrow via axum's `State` extractor.

use std::sync::Arc;

use amadeus_core::{InMemorySessionDirectory, RoomRegistry};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub sessions: Arc<InMemorySessionDirectory>,
}
