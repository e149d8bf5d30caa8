//! # CRD Generator
//!
//! Prints the `DynaKube` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/dynakube.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;

use dynakube_operator::crd::DynaKube;

fn main() {
    match serde_yaml::to_string(&DynaKube::crd()) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
