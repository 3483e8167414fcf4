mod event;
mod stats;
mod tenant;

pub use event::{
    BotSighting, ClientInfo, Dimensions, Event, EventGeo, EventPayload, EventType, LinkClick,
    NewEvent, PageUnload, PageView, Position,
};
pub use stats::{BotCount, CountryCount, Granularity, PageCount, StatsRecord};
pub use tenant::{Plan, Tenant};
