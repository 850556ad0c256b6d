mod config;
mod error;
mod logging;
mod state;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use interfaces::{Interface, PlugRef, SecuritySystem, StaticInfo, builtin, compile};
use serde::Serialize;

use config::Config;
use error::Result;
use state::StateFile;

const CONFIG_FILE: &str = "ifacectl.toml";

#[derive(Parser)]
#[command(name = "ifacectl")]
#[command(about = "Inspect capability interfaces and the policy they compile to", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./ifacectl.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every builtin interface
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show static information about one interface
    Info {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Compile a state file and print the policy of every security tag
    Compile {
        /// State file describing packages and connections
        #[arg(short, long)]
        state: PathBuf,
        /// Only print this backend (apparmor, dbus, kmod, udev)
        #[arg(short, long)]
        backend: Option<SecuritySystem>,
        #[arg(long)]
        json: bool,
    },
    /// List slots a plug would be auto-connected to
    Candidates {
        #[arg(short, long)]
        state: PathBuf,
        /// Plug as <package>:<plug>
        #[arg(short, long)]
        plug: String,
    },
}

#[derive(Serialize)]
struct InterfaceEntry {
    name: &'static str,
    #[serde(flatten)]
    info: StaticInfo,
}

fn main() {
    logging::init();
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List { json } => cmd_list(json),
        Commands::Info { name, json } => cmd_info(&name, json),
        Commands::Compile { state, backend, json } => cmd_compile(&config, &state, backend, json),
        Commands::Candidates { state, plug } => cmd_candidates(&config, &state, &plug),
    }
}

fn cmd_list(json: bool) -> Result<()> {
    let registry = builtin::registry();

    if json {
        let entries: Vec<InterfaceEntry> = registry
            .all()
            .map(|iface| InterfaceEntry {
                name: iface.name(),
                info: iface.static_info(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{:<16}  SUMMARY", "NAME");
    println!("{}", "-".repeat(80));
    for iface in registry.all() {
        println!("{:<16}  {}", iface.name(), iface.static_info().summary);
    }
    Ok(())
}

fn cmd_info(name: &str, json: bool) -> Result<()> {
    let registry = builtin::registry();
    let iface = registry.lookup(name)?;
    let info = iface.static_info();

    if json {
        let entry = InterfaceEntry {
            name: iface.name(),
            info,
        };
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    print!("{}", render_info(iface));
    Ok(())
}

/// Plain-text form of `info`: one aligned `label: value` line per field,
/// then the interface's base declaration text.
fn render_info(iface: &dyn Interface) -> String {
    let info = iface.static_info();
    let cardinality = iface.cardinality();
    let fields = [
        ("name", iface.name().to_string()),
        ("summary", info.summary.to_string()),
        ("implicit (trusted)", info.implicit_on_trusted.to_string()),
        ("implicit (isolated)", info.implicit_on_isolated.to_string()),
        ("connections/plug", limit(cardinality.plug)),
        ("connections/slot", limit(cardinality.slot)),
        ("self-connection", iface.allows_self_connection().to_string()),
    ];

    let mut out = String::new();
    for (label, value) in fields {
        out.push_str(&format!("{:<21}{value}\n", format!("{label}:")));
    }
    for text in [info.base_declaration_plugs, info.base_declaration_slots] {
        if !text.trim().is_empty() {
            out.push_str(&format!("\n{}\n", text.trim()));
        }
    }
    out
}

fn limit(max: Option<usize>) -> String {
    max.map_or_else(|| "unlimited".to_string(), |n| n.to_string())
}

fn cmd_compile(config: &Config, state: &Path, backend: Option<SecuritySystem>, json: bool) -> Result<()> {
    let repo = StateFile::load(state)?.into_repository(config, builtin::registry())?;
    let mut policy = compile(&repo.snapshot(), repo.registry(), config.host.mode)?;
    if let Some(only) = backend {
        policy.backends.retain(|system, _| *system == only);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&policy)?);
        return Ok(());
    }

    for (system, backend) in &policy.backends {
        for (tag, snippet) in backend.iter() {
            println!("=== {system} {tag} ===");
            print!("{snippet}");
            println!();
        }
    }
    Ok(())
}

fn cmd_candidates(config: &Config, state: &Path, plug: &str) -> Result<()> {
    let repo = StateFile::load(state)?.into_repository(config, builtin::registry())?;
    let (package, name) = state::parse_ref(plug, false)?;
    let candidates = repo.auto_connect_candidate_slots(&PlugRef::new(package, name))?;

    if candidates.is_empty() {
        println!("No auto-connect candidates for {plug}.");
        return Ok(());
    }
    for slot in candidates {
        println!("{slot}");
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interfaces::builtin::Ppp;
    use pretty_assertions::assert_eq;

    #[test]
    fn info_values_line_up() {
        let text = render_info(&Ppp);
        let fields: Vec<&str> = text.lines().take(7).collect();
        assert_eq!(fields[0], "name:                ppp");
        assert_eq!(fields[2], "implicit (trusted):  true");
        assert_eq!(fields[3], "implicit (isolated): true");
        assert_eq!(fields[4], "connections/plug:    unlimited");
        for line in fields {
            assert_eq!(&line[20..21], " ", "{line}");
            assert_ne!(&line[21..22], " ", "{line}");
        }
        assert!(text.contains("[slots.ppp]"));
    }
}
