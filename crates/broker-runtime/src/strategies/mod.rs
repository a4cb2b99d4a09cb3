//! Shipped [`ClientStrategy`](crate::strategy::ClientStrategy) implementations.

pub mod single_channel;

pub use single_channel::SingleChannelStrategy;
