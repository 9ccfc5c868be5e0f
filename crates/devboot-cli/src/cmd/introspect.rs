use devboot_core::{
    config::Config,
    credentials::{self, ProcessEnv},
    introspect::SchemaIntrospector,
};
use std::path::Path;

pub fn run(root: &Path, config: &Config) -> anyhow::Result<()> {
    let creds = credentials::require(&ProcessEnv, credentials::REQUIRED)?;
    let introspector = SchemaIntrospector::from_config(root, config);

    let tables = introspector.list_user_tables(&creds);
    let path = introspector.regenerate_model_source(&config.app, &tables, &creds)?;

    if tables.is_empty() {
        println!("No user tables; {} left empty", path.display());
    } else {
        let names: Vec<&str> = tables.iter().map(String::as_str).collect();
        println!("Regenerated {} for: {}", path.display(), names.join(", "));
    }
    Ok(())
}
