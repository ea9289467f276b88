use crate::models::SharedValue;

/// Outbound hook invoked once per accepted transition of the shared value
///
/// Called from inside the hub's critical section, in transition order.
/// Implementations must return quickly and must not call back into the hub.
pub trait ValueObserver: Send + Sync {
    fn on_value_changed(&self, value: &SharedValue);
}
