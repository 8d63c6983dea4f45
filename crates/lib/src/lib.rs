//! scopedeploy-lib: scoped infrastructure deployment
//!
//! This crate splits infrastructure into two lifecycle groups and deploys
//! them independently:
//! - `base`: long-lived shared resources (networking, DNS, IAM)
//! - `runtime`: short-lived compute (clusters, services, load balancers)
//!
//! Runtime resources find base resources through tag queries against the
//! provider's live inventory, never through shared state. Each
//! `(scope, environment)` pair owns its own locked state partition.

pub mod catalog;
pub mod config;
pub mod consts;
pub mod deploy;
pub mod execute;
pub mod guard;
pub mod plan;
pub mod platform;
pub mod provider;
pub mod reference;
pub mod scope;
pub mod state;

pub use deploy::{DeployError, DeployRequest, Deployer};
