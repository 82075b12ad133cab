//! Side effects requested by the core.
//!
//! `update` never performs I/O. HTTP and rendering use the stock Crux
//! capabilities; reading image dimensions is our own [`Images`] capability.
//! The shell-side transport that answers HTTP requests lives in [`http`].

pub mod http;
mod images;

pub use crux_core::render::Render;
pub use crux_http::Http;

pub use self::http::{HttpMethod, OutboundRequest, TransportError, ValidatedUrl};
pub use self::images::{Images, MeasureImages};

// The derive names `App` in the code it generates.
#[allow(unused_imports)]
use crate::app::App;
use crate::event::Event;

/// What every HTTP callback receives.
pub type HttpResult = crux_http::Result<crux_http::Response<Vec<u8>>>;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub render: Render<Event>,
    pub images: Images<Event>,
}
