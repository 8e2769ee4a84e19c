//! svcreg command-line management tool.
//!
//! Provides subcommands for generating and validating configuration files,
//! inspecting the attribute schema, converting registered services to and
//! from directory entries offline, and reading services from a live
//! directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use svcreg_core::config::AppConfig;
use svcreg_core::directory::{DirectoryEntry, LdapDirectory};
use svcreg_core::mapper::{AttributeSchema, ServiceMapper};
use svcreg_core::registry::ServiceRegistry;
use svcreg_core::service::{resolver, RegisteredService};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// svcreg command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "svcreg",
    version,
    about = "Inspect and convert registered services stored in an LDAP directory"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "/etc/svcreg/config.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./svcreg.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Show the effective attribute schema.
    Schema,

    /// Show which service variant a pattern resolves to.
    Resolve {
        /// Service-identifier pattern.
        pattern: String,
    },

    /// Convert a registered service (JSON) into a directory entry (JSON).
    ToEntry {
        /// Path to the service JSON file.
        service: PathBuf,

        /// Parent DN for the entry. Defaults to `directory.base_dn`.
        #[arg(long)]
        parent_dn: Option<String>,
    },

    /// Convert a directory entry (JSON) into a registered service (JSON).
    FromEntry {
        /// Path to the entry JSON file.
        entry: PathBuf,
    },

    /// List the registered services in the directory.
    List,

    /// Show a registered service from the directory.
    Show {
        /// Service identifier.
        id: i64,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins, then `--log-level`, then `[logging] log_level` from the
/// config file, then `warn`.
fn init_logging(cli: &Cli) {
    let level = cli.log_level.clone().unwrap_or_else(|| {
        AppConfig::load_from_file(&cli.config)
            .map(|c| c.logging.log_level)
            .unwrap_or_else(|_| "warn".to_string())
    });
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Resolve { pattern } => cmd_resolve(&pattern),
        Commands::Schema => cmd_schema(&schema_or_default(&cli.config)?),
        Commands::ToEntry { service, parent_dn } => {
            cmd_to_entry(&cli.config, &service, parent_dn.as_deref())
        }
        Commands::FromEntry { entry } => cmd_from_entry(&schema_or_default(&cli.config)?, &entry),
        Commands::List => cmd_list(&open_registry(&load_config(&cli.config)?)?),
        Commands::Show { id } => cmd_show(&open_registry(&load_config(&cli.config)?)?, id),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config =
        AppConfig::load_from_file(path).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// The configured schema, or the stock one when there is no config file.
/// The offline commands work without a directory.
fn schema_or_default(path: &Path) -> Result<AttributeSchema> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using default schema");
        return Ok(AttributeSchema::default());
    }
    Ok(load_config(path)?.schema)
}

fn open_registry(config: &AppConfig) -> Result<ServiceRegistry> {
    let mapper =
        ServiceMapper::new(config.schema.clone()).context("invalid attribute schema")?;
    let store = Arc::new(LdapDirectory::new(&config.directory));
    Ok(ServiceRegistry::new(
        mapper,
        store,
        config.directory.base_dn.clone(),
    ))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {} file {}", what, path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {} JSON in {}", what, path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# svcreg Configuration

[logging]
log_level = "info"

[directory]
url = "ldap://localhost:389"
base_dn = "ou=services,dc=example,dc=org"
# bind_dn = "cn=admin,dc=example,dc=org"
# bind_password_env = "SVCREG_BIND_PASSWORD"
timeout_secs = 10

# Physical attribute names. Every key is optional; the values below are the
# defaults.
[schema]
object_class = "casRegisteredService"
id_attribute = "uid"
service_id_attribute = "casServiceUrlPattern"
service_name_attribute = "cn"
service_description_attribute = "description"
service_enabled_attribute = "casServiceEnabled"
service_sso_enabled_attribute = "casServiceSsoEnabled"
service_proxy_policy_attribute = "casServiceProxyPolicy"
service_theme_attribute = "casServiceTheme"
username_attribute_provider_attribute = "casUsernameAttributeProvider"
attribute_release_policy_attribute = "casAttributeReleasePolicy"
evaluation_order_attribute = "casEvaluationOrder"
required_handlers_attribute = "casRequiredHandlers"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your directory details");
    println!("  2. Set the bind password variable if you bind as a user");
    println!(
        "  3. Validate with: svcreg validate --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    // Missing variables are warnings only.
    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Directory URL : {}", config.directory.url);
    println!("  Base DN       : {}", config.directory.base_dn);
    println!(
        "  Bind DN       : {}",
        config.directory.bind_dn.as_deref().unwrap_or("(anonymous)")
    );
    if config.directory.bind_dn.is_some() {
        println!(
            "  Bind password : {}",
            if config.directory.bind_password.is_some() {
                "set"
            } else {
                "NOT SET"
            }
        );
    }
    println!("  Timeout       : {}s", config.directory.timeout_secs);
    println!("  Object class  : {}", config.schema.object_class());
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_schema(schema: &AttributeSchema) -> Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Field", "Attribute"]);

    table.add_row(vec![Cell::new("object_class"), Cell::new(schema.object_class())]);
    for (field, attribute) in schema.attribute_fields() {
        table.add_row(vec![Cell::new(field), Cell::new(attribute)]);
    }

    println!("{}", table);
    Ok(())
}

fn cmd_resolve(pattern: &str) -> Result<()> {
    match resolver::resolve(pattern) {
        Some(variant) => {
            println!("{}", variant);
            Ok(())
        }
        None => anyhow::bail!("pattern {:?} does not resolve to a service variant", pattern),
    }
}

fn cmd_to_entry(config_path: &Path, service_path: &Path, parent_dn: Option<&str>) -> Result<()> {
    let (schema, base_dn) = if config_path.exists() {
        let config = load_config(config_path)?;
        (config.schema, Some(config.directory.base_dn))
    } else {
        (AttributeSchema::default(), None)
    };
    let parent_dn = parent_dn
        .map(str::to_string)
        .or(base_dn)
        .context("no parent DN: pass --parent-dn or provide a config file")?;

    let mut service: RegisteredService = read_json(service_path, "service")?;
    let mapper = ServiceMapper::new(schema).context("invalid attribute schema")?;
    let entry = mapper
        .to_entry(&parent_dn, &mut service)
        .context("failed to map service to entry")?;
    print_json(&entry)
}

fn cmd_from_entry(schema: &AttributeSchema, entry_path: &Path) -> Result<()> {
    let entry: DirectoryEntry = read_json(entry_path, "entry")?;
    let mapper = ServiceMapper::new(schema.clone()).context("invalid attribute schema")?;
    match mapper
        .from_entry(&entry)
        .context("failed to map entry to service")?
    {
        Some(service) => print_json(&service),
        None => anyhow::bail!("{} is not a registered service entry", entry.dn()),
    }
}

fn cmd_list(registry: &ServiceRegistry) -> Result<()> {
    let services = registry
        .load_all()
        .context("failed to load services from directory")?;

    if services.is_empty() {
        println!("No registered services under {}.", registry.base_dn());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Order", "Name", "Variant", "Pattern", "Enabled"]);

    for s in &services {
        let id = s
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let enabled = if s.enabled {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&id),
            Cell::new(s.evaluation_order),
            Cell::new(&s.name),
            Cell::new(s.variant.label()),
            Cell::new(&s.service_id),
            enabled,
        ]);
    }

    println!("{}", table);
    println!("{} service(s)", services.len());
    Ok(())
}

fn cmd_show(registry: &ServiceRegistry, id: i64) -> Result<()> {
    match registry
        .load_by_id(id)
        .with_context(|| format!("failed to load service {}", id))?
    {
        Some(service) => print_json(&service),
        None => anyhow::bail!("no registered service with id {}", id),
    }
}
