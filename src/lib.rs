//! Library surface behind the `winproxy-core` binary (`src/main.rs`).
//! Split out so `tests/` can drive the reconciler against
//! [`testutil::FakeGateway`] the same way the unit tests do.

pub mod config;
pub mod consts;
pub mod diffstore;
pub mod error;
pub mod hcn;
pub mod model;
pub mod reconciler;
pub mod sink;
pub mod testutil;
pub mod tracker;
pub mod translator;
