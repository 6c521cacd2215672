//! Show command - print an installed product version.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use prodcat_catalog::{ConfigMapStore, ImsResource, InstalledProductVersion, ProductCatalog};
use prodcat_core::store::{DEFAULT_RECORD_NAME, DEFAULT_RECORD_NAMESPACE, RecordKey};

use crate::{Config, OutputFormat};

/// Arguments for the show command.
#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Product name.
    #[arg()]
    pub product: String,

    /// Product version (defaults to the latest installed).
    #[arg()]
    pub version: Option<String>,

    /// Name of the catalog ConfigMap.
    #[arg(long, env = "CONFIG_MAP", default_value = DEFAULT_RECORD_NAME)]
    pub config_map: String,

    /// Namespace of the catalog ConfigMap.
    #[arg(long, env = "CONFIG_MAP_NAMESPACE", default_value = DEFAULT_RECORD_NAMESPACE)]
    pub namespace: String,
}

#[derive(Debug, Serialize)]
struct DockerImage<'a> {
    name: &'a str,
    version: &'a str,
}

#[derive(Debug, Serialize)]
struct ProductSummary<'a> {
    name: &'a str,
    version: &'a str,
    active: Option<bool>,
    docker_images: Vec<DockerImage<'a>>,
    repositories: Vec<&'a str>,
    clone_url: Option<&'a str>,
    commit: Option<&'a str>,
    import_branch: Option<&'a str>,
    images: Vec<ImsResource>,
    recipes: Vec<ImsResource>,
}

impl<'a> ProductSummary<'a> {
    fn new(product: &'a InstalledProductVersion) -> Self {
        Self {
            name: &product.name,
            version: &product.version,
            active: product.supports_active().then(|| product.active()),
            docker_images: product
                .docker_images()
                .into_iter()
                .map(|(name, version)| DockerImage { name, version })
                .collect(),
            repositories: product.hosted_and_member_repo_names().into_iter().collect(),
            clone_url: product.clone_url(),
            commit: product.commit(),
            import_branch: product.import_branch(),
            images: product.images(),
            recipes: product.recipes(),
        }
    }

    fn render_text(&self) -> String {
        let mut out = format!("{}-{}\n", self.name, self.version);
        if let Some(active) = self.active {
            out.push_str(&format!("  Active:          {active}\n"));
        }
        if let Some(url) = self.clone_url {
            out.push_str(&format!("  Config Repo:     {url}\n"));
        }
        if let Some(commit) = self.commit {
            out.push_str(&format!("  Config Commit:   {commit}\n"));
        }
        if let Some(branch) = self.import_branch {
            out.push_str(&format!("  Import Branch:   {branch}\n"));
        }
        for image in &self.docker_images {
            out.push_str(&format!("  Docker Image:    {}:{}\n", image.name, image.version));
        }
        for repo in &self.repositories {
            out.push_str(&format!("  Repository:      {repo}\n"));
        }
        for (kind, resources) in [("Image", &self.images), ("Recipe", &self.recipes)] {
            for resource in resources {
                let id = resource.id.as_deref().unwrap_or("-");
                out.push_str(&format!("  {:<17}{} ({id})\n", format!("{kind}:"), resource.name));
            }
        }
        out
    }
}

/// Execute the show command.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read or the product is not
/// installed.
pub async fn execute(args: ShowArgs, config: &Config) -> Result<()> {
    let record = RecordKey::new(args.config_map, args.namespace);
    let store = ConfigMapStore::new(config.kube_config()?)?;
    let catalog = ProductCatalog::load(&store, &record)
        .await
        .with_context(|| format!("failed to read product catalog {record}"))?;
    let product = catalog.get_product(&args.product, args.version.as_deref())?;
    let summary = ProductSummary::new(product);

    match config.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print!("{}", summary.render_text()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> InstalledProductVersion {
        let data = serde_yaml::from_str(
            r"
component_versions:
  docker:
    - {name: cray/sat, version: 3.4.0}
  repositories:
    - {name: sat-sle, type: group, members: [sat-2.0.0-sle]}
configuration:
  commit: 0123abcd
images:
  sat-image: {id: 8b3a8e6c}
active: true
",
        )
        .expect("yaml");
        InstalledProductVersion::new("sat", "2.0.0", data).expect("valid")
    }

    #[test]
    fn test_show_args_parsing() {
        use clap::Parser;

        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: ShowArgs,
        }

        let cli = TestCli::parse_from(["test", "sat", "2.0.0", "--namespace", "default"]);
        assert_eq!(cli.args.product, "sat");
        assert_eq!(cli.args.version.as_deref(), Some("2.0.0"));
        assert_eq!(cli.args.namespace, "default");
    }

    #[test]
    fn test_text_summary() {
        let product = product();
        let text = ProductSummary::new(&product).render_text();
        assert!(text.starts_with("sat-2.0.0\n"));
        assert!(text.contains("Active:          true"));
        assert!(text.contains("Docker Image:    cray/sat:3.4.0"));
        assert!(text.contains("Repository:      sat-2.0.0-sle"));
        assert!(text.contains("Image:           sat-image (8b3a8e6c)"));
    }

    #[test]
    fn test_json_summary() {
        let product = product();
        let json = serde_json::to_value(ProductSummary::new(&product)).expect("json");
        assert_eq!(json["commit"], "0123abcd");
        assert_eq!(json["images"][0]["id"], "8b3a8e6c");
        assert_eq!(json["docker_images"][0]["version"], "3.4.0");
    }
}
