//! assetlink - CRUD, async-task and signed object-storage client for an
//! asset-management platform

pub mod api;
pub mod cli;
pub mod config;
pub mod crud;
pub mod error;
pub mod filter;
pub mod payload;
pub mod s3;
pub mod task;
pub mod transport;

pub use api::Api;
pub use config::Config;
pub use error::{ApiError, Result};
pub use filter::{compile, FilterNode};
pub use payload::{Payload, ReadQuery};
pub use task::{AsyncTask, AsyncTaskClient};
pub use transport::{HttpRequest, HttpResponse, Transport, TransportError};
