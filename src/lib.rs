//! # Secrets Provisioner
//!
//! Declarative secrets for Kubernetes: `secrets.yaml` files declare which secrets a
//! deployment needs, the secrets are provisioned in a cloud secret backend, and the
//! External Secrets Operator manifests that sync them into the cluster are generated.
//!
//! ## Pipeline
//!
//! 1. [`declaration`] parses and validates declaration files
//! 2. [`provider`] creates missing keys in GCP Secret Manager or AWS Secrets Manager
//! 3. [`manifest`] renders and writes `ClusterSecretStore` / `ExternalSecret` manifests
//! 4. [`cluster`] checks the live cluster for drift
//!
//! [`bootstrap`] sets up the backend identity the sync controller uses, once per project.
//! [`orchestrator`] ties steps 1-3 together.

pub mod backoff;
pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod declaration;
pub mod error;
pub mod manifest;
pub mod observability;
pub mod orchestrator;
pub mod provider;
pub mod value_source;

pub use error::{Error, Result};
