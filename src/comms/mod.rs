// src/comms/mod.rs

pub mod dispatcher;
pub mod gateway;

pub use dispatcher::{DeliveryEvent, DispatchError, Dispatcher};
pub use gateway::{ChannelGateway, GatewayError, SimulatedGateway};
