//! Logical topic definitions.

/// The three logical streams of the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Reserve commands, orchestrator → engine.
    ReserveCommands,
    /// Release (compensation) commands, orchestrator → engine.
    ReleaseCommands,
    /// Inventory results, engine → orchestrator.
    Results,
}

impl Topic {
    /// All topics, in declaration order.
    pub const ALL: [Topic; 3] = [
        Topic::ReserveCommands,
        Topic::ReleaseCommands,
        Topic::Results,
    ];

    /// Returns the topic's stream name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ReserveCommands => "oms.reserve-inventory.0",
            Topic::ReleaseCommands => "oms.release-inventory.0",
            Topic::Results => "oms.inventory-response.0",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
