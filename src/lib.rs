//! Acquire daily GNSS RINEX observation files from public archives.
//!
//! A [`request::DownloadRequest`] is resolved against the archive policy
//! ([`policy::resolve`]), then the [`engine::Downloader`] walks the requested day
//! range, trying archives and stream tokens in a fixed order and handing each
//! fetched file to the [`convert::ConversionPipeline`].

pub mod archive;
pub mod config;
pub mod convert;
pub mod domain;
pub mod engine;
pub mod error;
pub mod naming;
pub mod output;
pub mod policy;
pub mod request;
pub mod station;
pub mod tools;
