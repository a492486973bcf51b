//! # CRD Generator
//!
//! Prints the RevisionOperator CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/revisionoperator.yaml
//! ```

use anyhow::{Context, Result};
use kube::CustomResourceExt;
use revision_controller::RevisionOperator;

fn main() -> Result<()> {
    let crd = serde_yaml::to_string(&RevisionOperator::crd())
        .context("Failed to serialize RevisionOperator CRD")?;
    print!("{crd}");
    Ok(())
}
