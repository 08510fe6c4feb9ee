//! Process-variable layer mapping device ports onto named PVs.

pub mod adapter;
pub mod subscription;

pub use adapter::{Binding, VariableAdapter, VariableInfo};
pub use subscription::{Subscription, SubscriptionHub, SubscriptionId, ValueChange};
