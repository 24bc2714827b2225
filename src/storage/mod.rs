mod feeds;
mod posts;
mod schema;
mod store;
mod types;

pub use schema::Database;
pub use store::FeedStore;
pub use types::{Feed, NewPost, Post, StoreError};
