//! pmaxstat - PowerMax/VMAX metrics collection library.
//!
//! One collection run validates the Unisphere environment, resolves which
//! categories and metrics to collect, then walks every enabled asset category
//! and emits one flat record per asset.
//!
//! Used by:
//! - `pmaxstatd` - daemon that runs collections on the configured interval

pub mod category;
pub mod client;
pub mod collector;
pub mod config;
pub mod context;
pub mod normalize;
pub mod orchestrator;
pub mod resolver;
pub mod sink;
pub mod validator;
