//! This crate provides simstage, a web service that turns archived simulation output held in a
//! [Girder](https://girder.readthedocs.io/) asset store into artifacts a browser can consume
//! directly.
//!
//! Two pipelines share the same shape: locate a remote item, stage it into per-request scratch
//! space, decode or transcode it locally and return the result.
//!
//! * The timestep pipeline finds the `<n>.tgz` archive of a timestep in a group's `timesteps`
//!   folder, extracts it, reads a named variable from the NetCDF classic container inside and
//!   returns it as nested JSON arrays.
//! * The movie pipeline downloads an item holding an SVG or PNG frame sequence and encodes it to
//!   an mp4 video using an external `ffmpeg` executable.
//!
//! Scratch space is always removed once a request completes, whether it succeeded or not.
//!
//! simstage is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [reqwest] talks to the Girder REST API.
//! * [tar] and [flate2] unpack timestep archives.
//! * [ndarray] reshapes decoded variables before they are rendered as JSON.

pub mod app;
pub mod app_state;
pub mod array;
pub mod asset_store;
pub mod cli;
pub mod container;
pub mod error;
pub mod extract;
pub mod girder_client;
pub mod locator;
pub mod metrics;
pub mod models;
pub mod projection;
pub mod resource_manager;
pub mod scratch;
pub mod server;
pub mod stager;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod transcoder;
pub mod validated_query;
