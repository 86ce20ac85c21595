pub mod countries;
pub mod pipeline;
pub mod service;
pub mod session;

pub use pipeline::{ListingMeta, RenderedPage, render};
pub use service::{ListingConfig, ListingView, TourListing};
pub use session::{FetchSession, SessionTracker};
