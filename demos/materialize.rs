use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use varsmith::{AppContext, Config};

#[derive(Debug, Deserialize)]
struct AppConfig {
    app: AppSection,
    database: DatabaseSection,
    features: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AppSection {
    name: String,
    debug: bool,
}

#[derive(Debug, Deserialize)]
struct DatabaseSection {
    url: String,
    pool: u32,
}

fn main() -> Result<(), varsmith::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let environment = std::env::args().nth(1).unwrap_or_else(|| "dev".to_string());

    let ctx: AppContext<AppConfig> = AppContext::materialize(
        Config::builder()
            .with_environment(environment)
            .with_vars_file("demos/vars.yaml")
            .with_template_file("demos/app.yaml.tpl")
            .with_override_file("demos/override.yaml", false),
    )?;

    let config = ctx.config();
    println!("[{}] {} (debug={})", ctx.environment(), config.app.name, config.app.debug);
    println!("Database: {} (pool={})", config.database.url, config.database.pool);
    println!("Features: {}", config.features.join(", "));

    Ok(())
}
