//! Prints the FleetOps CRD manifests as YAML
//!
//! Usage: `cargo run --bin crdgen > manifests/crds.yaml`

use crds::{Cluster, MachinePool};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Cluster::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&MachinePool::crd())?);
    Ok(())
}
