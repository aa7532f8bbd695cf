//! # initfetch
//!
//! Request lifecycle state for UI-style consumers.
//!
#![deny(unsafe_code)]

//! A [`Session`] holds a base URL and default request options. From it you
//! build three kinds of operations, each exposing observable state:
//!
//! - [`SendOperation`]: a request fired on demand (`is_sending`, `error`).
//! - [`FetchOperation`]: a GET loaded once when its consumer activates, with
//!   `refetch` and automatic abort on deactivation (`is_fetching`,
//!   `is_loading`, `error`).
//! - [`InfiniteFetchOperation`]: a fetch that accumulates pages as the path
//!   changes, until the callback reports there is no next page.
//!
//! Request options merge in layers: session defaults, then the operation's
//! `init`, then per-call options. Headers merge key by key; every other field
//! is replaced. A layer may be computed asynchronously from the layer beneath
//! it via [`RequestOptionsProvider::deferred`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use initfetch::prelude::*;
//!
//! let session = Session::new("https://api.example.com", None);
//! let posts = session.fetch(FetchOptions::new(
//!     "/posts",
//!     callback(|response: HttpResponse| async move {
//!         let posts: Vec<Post> = response.error_for_status()?.json()?;
//!         store(posts);
//!         Ok(())
//!     }),
//! ));
//!
//! posts.on_activate();
//! // ... later, when the consumer goes away:
//! posts.on_deactivate();
//! ```

pub mod callback;
pub mod config;
pub mod defaults;
pub mod error;
pub mod fetch;
pub mod infinite;
pub mod options;
pub mod response;
pub mod send;
pub mod session;
pub mod signal;
pub mod state;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use callback::{Callback, accept_any, callback};
pub use config::{HttpConfig, HttpConfigBuilder};
pub use error::{FetchError, Result};
pub use fetch::{FetchOperation, FetchOptions};
pub use infinite::{InfiniteFetchOperation, InfiniteFetchOptions, InfiniteFetchState};
pub use options::{Credentials, RequestOptions, RequestOptionsProvider};
pub use response::HttpResponse;
pub use send::{SendOperation, SendOptions};
pub use session::{Session, SessionBuilder};
pub use signal::{AbortController, AbortSignal};
pub use state::{LifecycleState, PageState, StateCell};
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest};

pub mod prelude {
    pub use crate::{
        AbortController, AbortSignal, Callback, Credentials, FetchError, FetchOperation,
        FetchOptions, HttpResponse, InfiniteFetchOperation, InfiniteFetchOptions,
        RequestOptions, RequestOptionsProvider, SendOperation, SendOptions, Session,
        accept_any, callback,
    };
}
