//! The fixed set of metrics a [`crate::Reporter`] knows about. Reporting
//! under any other name is a no-op.

use crate::metrics::{CounterDef, GaugeDef, SummaryDef};

/// Every catalog metric lives under this namespace.
pub const NAMESPACE: &str = "nano";

/// Time to process a message, per route.
pub const RESPONSE_TIME: &str = "response_time_ns";
/// Delay before a message starts being processed, per route.
pub const PROCESS_DELAY: &str = "process_delay_ns";
pub const CONNECTED_CLIENTS: &str = "connected_clients";
/// Live tasks (or green threads) of the host process.
pub const GOROUTINES: &str = "goroutines";
pub const HEAP_SIZE: &str = "heap_size";
pub const HEAP_OBJECTS: &str = "heap_objects";
pub const MESSAGE_COUNT: &str = "message_count";
pub const EXCEEDED_RATE_LIMIT: &str = "exceeded_rate_limiting";

/// Label carrying the handler route on the per-route summaries.
pub const ROUTE_LABEL: &str = "route";

pub const SUMMARIES: &[SummaryDef] = &[
    SummaryDef::new(
        "handler",
        RESPONSE_TIME,
        "the time to process a msg in nanoseconds",
    )
    .with_labels(&[ROUTE_LABEL]),
    SummaryDef::new(
        "handler",
        PROCESS_DELAY,
        "the delay to start processing a msg in nanoseconds",
    )
    .with_labels(&[ROUTE_LABEL]),
];

pub const GAUGES: &[GaugeDef] = &[
    GaugeDef::new(
        "acceptor",
        CONNECTED_CLIENTS,
        "the number of clients connected right now",
    ),
    GaugeDef::new("sys", GOROUTINES, "the current number of goroutines"),
    GaugeDef::new("sys", HEAP_SIZE, "the current heap size"),
    GaugeDef::new(
        "sys",
        HEAP_OBJECTS,
        "the current number of allocated heap objects",
    ),
    GaugeDef::new(
        "acceptor",
        MESSAGE_COUNT,
        "the current number of processed message",
    ),
];

pub const COUNTERS: &[CounterDef] = &[CounterDef::new(
    "acceptor",
    EXCEEDED_RATE_LIMIT,
    "the number of blocked requests by exceeded rate limiting",
)];
