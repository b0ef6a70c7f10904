//! Application state and composition.
//!
//! Everything process-wide is constructed once here and passed explicitly;
//! no globals, no ambient context.

use std::sync::Arc;

use crate::api::connections::ConnectionManager;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::ports::{
    AuthPort, BusPort, ClockPort, DocumentStore, InterpreterPort, TemplateSource,
};
use crate::use_cases::aoi::AoiBuilder;
use crate::use_cases::deltas::DeltaBuilder;
use crate::use_cases::dispatch::CommandDispatcher;
use crate::use_cases::handlers::{AdminRouter, CollectItem, DropItem, Go, Inventory};
use crate::use_cases::state::StateManager;
use crate::use_cases::templates::TemplateResolver;

/// Main application state, passed to WebSocket handlers via axum state.
pub struct App {
    pub config: AppConfig,
    pub auth: Arc<dyn AuthPort>,
    pub bus: Arc<dyn BusPort>,
    pub clock: Arc<dyn ClockPort>,
    pub state: Arc<StateManager>,
    pub resolver: Arc<TemplateResolver>,
    pub aoi: AoiBuilder,
    pub dispatcher: CommandDispatcher,
    pub connections: Arc<ConnectionManager>,
}

impl App {
    /// Create a new App with all dependencies wired up.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        bus: Arc<dyn BusPort>,
        templates: Arc<dyn TemplateSource>,
        interpreter: Option<Arc<dyn InterpreterPort>>,
        auth: Arc<dyn AuthPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        let resolver = Arc::new(TemplateResolver::new(templates));
        let state = Arc::new(StateManager::new(
            store,
            bus.clone(),
            clock.clone(),
            DeltaBuilder::new(resolver.clone()),
        ));
        let aoi = AoiBuilder::new(
            state.clone(),
            resolver.clone(),
            clock.clone(),
            config.aoi.zone_radius_m,
        );

        // The handler registry is built once and read-only afterwards.
        let admin = Arc::new(AdminRouter::new(state.clone(), resolver.clone()));
        let mut dispatcher = CommandDispatcher::new(admin, interpreter);
        dispatcher.register(
            "collect_item",
            Arc::new(CollectItem::new(state.clone(), resolver.clone())),
        );
        dispatcher.register(
            "drop_item",
            Arc::new(DropItem::new(state.clone(), resolver.clone())),
        );
        dispatcher.register(
            "inventory",
            Arc::new(Inventory::new(state.clone(), resolver.clone())),
        );
        dispatcher.register("go", Arc::new(Go::new(state.clone())));

        tracing::info!(
            actions = ?dispatcher.registered_actions(),
            "Fast-handler registry built"
        );

        Self {
            config,
            auth,
            bus,
            clock,
            state,
            resolver,
            aoi,
            dispatcher,
            connections: Arc::new(ConnectionManager::new()),
        }
    }
}
