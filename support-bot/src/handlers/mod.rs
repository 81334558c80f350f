//! Update handlers run by the handler chain, in order: callbacks, broadcast, group topics,
//! private chats. Middleware filters and logs before any of them.

mod broadcast;
mod callbacks;
mod filters;
mod group;
mod private;

pub use broadcast::BroadcastHandler;
pub use callbacks::CallbackHandler;
pub use filters::{LoggingMiddleware, UpdateFilter};
pub use group::GroupHandler;
pub use private::{my_data_keyboard, profile_of, PrivateHandler};
