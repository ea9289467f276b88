// Module: sync

pub mod cell;
pub mod hub;
pub mod observer;
pub mod registry;

pub use cell::SharedStateCell;
pub use hub::{HubConfig, Subscription, SyncHub};
pub use observer::ValueObserver;
pub use registry::{
    BroadcastReport, DeliveryError, MessageReceiver, MessageSender, Registration, Subscriber,
    SubscriberRegistry,
};
