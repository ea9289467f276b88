pub mod id;
pub mod value;

pub use id::SubscriberId;
pub use value::{SharedValue, ValueState};
