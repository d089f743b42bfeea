//! # kanban_board
//!
//! Client-side state engine for a drag-and-drop Kanban board backed by a REST task
//! service.
//!
//! - [`api`]: typed gateway to the service ([`api::HttpGateway`]), plus an in-memory
//!   simulation for tests behind the `test-support` feature.
//! - [`store`]: the task collection and board UI state. Every mutation applies
//!   locally first and returns a [`store::Persist`] future carrying the remote
//!   write and its compensating action.
//! - [`derive`]: filtering, column grouping and ordering, assignee/tag facets.
//! - [`drag`]: the drag gesture state machine.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kanban_board::{api::HttpGateway, config::BoardConfig, store::TaskStore, fields::Priority};
//!
//! let config = BoardConfig::default();
//! let store = TaskStore::new(Arc::new(HttpGateway::new(&config)?), &config);
//! store.load().await;
//! let persist = store.update_priority(&"12".into(), Priority::Urgent)?;
//! tokio::spawn(persist);
//! ```

pub mod api;
pub mod config;
pub mod derive;
pub mod drag;
pub mod error;
pub mod fields;
pub mod store;
pub mod task;

pub use error::{BoardError, Result};
