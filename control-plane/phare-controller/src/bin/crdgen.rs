use kube::core::CustomResourceExt;
use phare_controller::crd::Phare;

fn main() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&Phare::crd())?;
    println!("{}", yaml);
    Ok(())
}
