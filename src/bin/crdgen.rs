use convoy_operator::crd::AppInstance;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&AppInstance::crd())?);
    Ok(())
}
