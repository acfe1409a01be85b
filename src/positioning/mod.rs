//! Positioning stack: device fixes, geodesy and movement filtering
pub mod feed;
pub mod filters;
pub mod geodesy;
pub mod source;

pub use self::feed::{FeedPositionSource, PositionFeed};
pub use self::filters::{is_significant, Filter, MovementFilter};
pub use self::source::{
    PositionEvent, PositionOptions, PositionSource, PositionWatch, SubscriptionHandle,
};
