use anyhow::{bail, Context, Result};
use localized_fields::config::{self, Settings};
use localized_fields::field::slugify;
use localized_fields::resolver;
use localized_fields::value::{LocalizedValue, Raw};
use serde_json::Value;
use std::io::Read;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("localized_fields=info".parse()?),
        )
        .init();

    // Load configuration from environment
    let settings = Settings::from_env()?;
    info!(
        "Primary language '{}', {} language(s) configured",
        settings.language_code,
        settings.languages.len()
    );
    config::reload(settings);

    // The document comes from the first argument or stdin
    let raw = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read document from stdin")?;
            buf
        }
    };
    let document: Value = serde_json::from_str(&raw).context("Document must be JSON")?;
    if !document.is_object() {
        bail!("Document must be a JSON object of language codes to values");
    }

    let value = LocalizedValue::<Raw>::from_json(document);
    let settings = config::settings();
    for lang in &settings.languages {
        let chain = resolver::language_chain(&settings, &lang.code);
        let resolved = resolver::resolve_in(&value, &settings, &lang.code);
        match resolved {
            Some((from, v)) => {
                let slug = v.as_str().map(slugify).unwrap_or_default();
                println!(
                    "{} ({}): {} [from {}, chain {}] slug '{}'",
                    lang.code,
                    lang.name,
                    v,
                    from,
                    chain.join(" > "),
                    slug
                );
            }
            None => println!(
                "{} ({}): - [chain {}]",
                lang.code,
                lang.name,
                chain.join(" > ")
            ),
        }
    }

    Ok(())
}
