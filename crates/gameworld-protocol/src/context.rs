//! Shared state handed to every session.

use std::sync::Arc;

use crate::dispatch::OpcodeTable;
use crate::executor::Dispatcher;
use crate::live_cast::LiveCastRegistry;
use crate::settings::{LiveCastSettings, ProtocolSettings};

/// Everything a session needs beyond its own connection.
pub struct SessionContext {
    pub settings: ProtocolSettings,
    pub cast_settings: LiveCastSettings,
    pub registry: Arc<LiveCastRegistry>,
    pub dispatcher: Dispatcher,
    pub opcodes: OpcodeTable,
}

impl SessionContext {
    /// Context with the standard opcode table.
    pub fn new(
        settings: ProtocolSettings,
        cast_settings: LiveCastSettings,
        registry: Arc<LiveCastRegistry>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            settings,
            cast_settings,
            registry,
            dispatcher,
            opcodes: OpcodeTable::standard(),
        }
    }
}
