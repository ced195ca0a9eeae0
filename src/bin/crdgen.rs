//! # CRD Generator
//!
//! Prints the `ObjectBucket` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use object_bucket_controller::crd::ObjectBucket;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ObjectBucket::crd())?);
    Ok(())
}
