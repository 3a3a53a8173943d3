// The feed pipeline: grouping, rendering, live append and name resolution,
// driven by one `FeedSession` per view. Nothing here touches the terminal.

pub mod card;
pub mod grouping;
pub mod live;
pub mod names;
pub mod notify;
pub mod recency;
pub mod render;
pub mod session;

pub use card::{Card, CardContext, CardDetail};
pub use names::{NameCache, NameKind, NameResolver};
pub use recency::RecencyWindow;
pub use render::{FeedItem, FeedView, RenderMode};
pub use session::{FeedSession, Latency, SearchResults, SessionSettings};
