//! Property scenarios for the chaos sensor.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Same seed and ticks, two fresh sensors, identical output
    Determinism,
    
    /// Every value within 0..=100
    Range,
    
    /// Timestamps copied verbatim, including non-ISO strings
    Fidelity,
    
    /// N ticks in, N readings out, same order
    OneToOne,
    
    /// 1000 ticks back-to-back, no gaps, duplicates or reordering
    RapidFire,
    
    /// Ticks delivered from several threads through a locked reactor
    ConcurrentDelivery,
    
    /// Broker rejects some readings; later values are unaffected
    PublishFailure,
    
    /// Clock interval changed through the tick-delay control topic
    TickDelay,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Determinism,
            ScenarioId::Range,
            ScenarioId::Fidelity,
            ScenarioId::OneToOne,
            ScenarioId::RapidFire,
            ScenarioId::ConcurrentDelivery,
            ScenarioId::PublishFailure,
            ScenarioId::TickDelay,
        ]
    }
    
    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Determinism => "determinism",
            ScenarioId::Range => "range",
            ScenarioId::Fidelity => "fidelity",
            ScenarioId::OneToOne => "one_to_one",
            ScenarioId::RapidFire => "rapid_fire",
            ScenarioId::ConcurrentDelivery => "concurrent_delivery",
            ScenarioId::PublishFailure => "publish_failure",
            ScenarioId::TickDelay => "tick_delay",
        }
    }
    
    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Determinism => "Two fresh sensors with the same seed see the same ticks and publish identical readings",
            ScenarioId::Range => "Every published value lies in 0..=100",
            ScenarioId::Fidelity => "Reading timestamps equal tick timestamps byte for byte",
            ScenarioId::OneToOne => "Exactly one reading per tick, in tick order",
            ScenarioId::RapidFire => "1000 ticks queued at once, all answered in order",
            ScenarioId::ConcurrentDelivery => "4 threads deliver ticks; draws stay one per tick",
            ScenarioId::PublishFailure => "A third of readings rejected; surviving values match a clean run",
            ScenarioId::TickDelay => "tick_delay control changes the clock interval; bad payloads ignored",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "determinism" => Ok(ScenarioId::Determinism),
            "range" => Ok(ScenarioId::Range),
            "fidelity" => Ok(ScenarioId::Fidelity),
            "one_to_one" | "onetoone" => Ok(ScenarioId::OneToOne),
            "rapid_fire" | "rapidfire" => Ok(ScenarioId::RapidFire),
            "concurrent_delivery" | "concurrent" => Ok(ScenarioId::ConcurrentDelivery),
            "publish_failure" | "publishfailure" => Ok(ScenarioId::PublishFailure),
            "tick_delay" | "tickdelay" => Ok(ScenarioId::TickDelay),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
