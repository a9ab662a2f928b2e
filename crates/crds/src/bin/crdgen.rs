//! Prints every CRD as a multi-document YAML stream.

use crds::{Database, PostgreSql, ProjectVpc, ServiceUser};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        ProjectVpc::crd(),
        PostgreSql::crd(),
        Database::crd(),
        ServiceUser::crd(),
    ];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
