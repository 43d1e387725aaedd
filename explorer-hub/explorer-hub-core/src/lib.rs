pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod model;
pub mod node;
pub mod permission;
pub mod service;
pub mod storage;
pub mod types;
pub mod view;

pub use error::{ExplorerError, Result};
pub use node::{DocRef, ExplorerNode, NodeKey};
pub use service::ExplorerService;
