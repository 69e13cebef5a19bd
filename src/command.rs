use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "delegate")]
#[command(about = "Delegate a secret store credential to a Red October server")]
pub struct Args {
    /// Secret store label
    pub label: String,
    /// How many delegations are going out? [default: 5]
    #[arg(short = 'n')]
    pub count: Option<u32>,
    /// CA file for Red October
    #[arg(long)]
    pub ca: Option<String>,
    /// Path to password store [default: ~/.secrets.db]
    #[arg(short = 'f')]
    pub store: Option<PathBuf>,
    /// Use the interactive key-derivation profile
    #[arg(short = 'i', overrides_with = "standard")]
    pub interactive: bool,
    /// Use the standard key-derivation profile, even if the config asks for interactive
    #[arg(long, overrides_with = "interactive")]
    pub standard: bool,
    /// How long should the delegation be active for? [default: 1h]
    #[arg(long = "for")]
    pub duration: Option<String>,
    /// Red October labels to use for decryption (comma-separated)
    #[arg(long)]
    pub labels: Option<String>,
    /// host:port of Red October server [default: 127.0.0.1:8080]
    #[arg(long)]
    pub server: Option<String>,
    /// Users to whitelist for decryption (comma-separated)
    #[arg(long = "to")]
    pub owners: Option<String>,
    /// Username for Red October
    #[arg(short = 'u')]
    pub user: Option<String>,
}
