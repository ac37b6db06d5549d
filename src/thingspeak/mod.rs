pub mod client;
pub mod decode;

pub use client::{FeedError, FeedSource, ThingSpeakClient, DEFAULT_BASE_URL};
pub use decode::{ChannelInfo, FeedEntry, FeedPage};
