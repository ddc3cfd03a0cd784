//! Command line interface

use crate::config::{default_certs_dir, GatewayConfig};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Args, CommandFactory, Parser, Subcommand};
use ming_backend::s3::DEFAULT_S3_ENDPOINT;
use ming_backend::{MemoryGateway, NasGateway, S3Gateway};
use ming_core::Gateway;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Registered backend sub-commands
pub const SUB_COMMANDS: &[&str] = &["nas", "s3", "memory"];

#[derive(Parser, Debug)]
#[command(name = "ming")]
#[command(about = "S3-compatible gateway in front of NAS, remote S3 and other storage")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub backend: BackendCommand,
}

/// Flags shared by every backend
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Bind to a specific ADDRESS:PORT, ADDRESS can be an IP or hostname
    #[arg(long, global = true, default_value = ":9000", env = "MING_ADDRESS")]
    pub address: String,

    /// Path to the certs directory [default: $HOME/.ming/certs]
    #[arg(short = 'S', long, global = true, env = "MING_CERTS_DIR")]
    pub certs_dir: Option<PathBuf>,

    /// Disable the startup banner
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Hide sensitive information from the startup banner
    #[arg(long, global = true)]
    pub anonymous: bool,

    /// Output logs in JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true, env = "MING_DEBUG")]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum BackendCommand {
    /// Serve a local or network-mounted directory
    Nas {
        /// Directory holding one sub-directory per bucket
        path: PathBuf,
    },

    /// Serve a remote S3-compatible endpoint
    S3 {
        /// Endpoint URL; without a scheme https is assumed
        #[arg(default_value = DEFAULT_S3_ENDPOINT)]
        endpoint: String,
    },

    /// Serve from process memory; contents are lost on exit
    Memory {
        #[arg(hide = true)]
        extra: Option<String>,
    },
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nas { .. } => "nas",
            Self::S3 { .. } => "s3",
            Self::Memory { .. } => "memory",
        }
    }

    /// `ming <backend> help`
    pub fn wants_help(&self) -> bool {
        match self {
            Self::Nas { path } => path.as_os_str() == "help",
            Self::S3 { endpoint } => endpoint == "help",
            Self::Memory { extra } => extra.as_deref() == Some("help"),
        }
    }

    pub fn into_gateway(self) -> Arc<dyn Gateway> {
        match self {
            Self::Nas { path } => Arc::new(NasGateway::new(path)),
            Self::S3 { endpoint } => Arc::new(S3Gateway::new(endpoint)),
            Self::Memory { .. } => Arc::new(MemoryGateway::new()),
        }
    }
}

impl GlobalArgs {
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            address: self.address.clone(),
            certs_dir: self.certs_dir.clone().unwrap_or_else(default_certs_dir),
            quiet: self.quiet,
            anonymous: self.anonymous,
            json: self.json,
            debug: self.debug,
        }
    }
}

/// Why the command line could not be turned into a [`Cli`]
#[derive(Debug)]
pub enum CliError {
    /// The first positional named no registered backend
    UnknownCommand { typed: String, suggestions: Vec<&'static str> },
    Clap(clap::Error),
}

impl CliError {
    /// Print the error the way the operator expects and pick the exit code
    pub fn report(self) -> ExitCode {
        match self {
            Self::UnknownCommand { typed, suggestions } => {
                eprint!("{}", unknown_command_message(&typed, &suggestions));
                ExitCode::from(1)
            }
            Self::Clap(e) => {
                let _ = e.print();
                ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
            }
        }
    }
}

impl Cli {
    /// Parse `args`, turning an unknown sub-command into suggestions
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| {
            if e.kind() != ErrorKind::InvalidSubcommand {
                return CliError::Clap(e);
            }
            match e.get(ContextKind::InvalidSubcommand) {
                Some(ContextValue::String(typed)) => CliError::UnknownCommand {
                    suggestions: closest_commands(typed, SUB_COMMANDS),
                    typed: typed.clone(),
                },
                _ => CliError::Clap(e),
            }
        })
    }

    /// Print the help of the selected backend sub-command
    pub fn print_backend_help(&self) {
        let mut command = Self::command();
        if let Some(sub) = command.find_subcommand_mut(self.backend.name()) {
            let _ = sub.print_help();
        }
    }
}

/// Text printed for an unknown sub-command
pub fn unknown_command_message(typed: &str, suggestions: &[&str]) -> String {
    let mut message = format!("'{typed}' is not a ming sub-command. See 'ming --help'.\n");
    if !suggestions.is_empty() {
        message.push_str("\nDid you mean one of these?\n");
        for name in suggestions {
            message.push_str(&format!("\t'{name}'\n"));
        }
    }
    message
}

/// Registered names starting with `typed`, then names within one edit of it
pub fn closest_commands(typed: &str, names: &[&'static str]) -> Vec<&'static str> {
    let mut prefixed: Vec<&'static str> = names.iter().copied().filter(|n| n.starts_with(typed)).collect();
    prefixed.sort_unstable();

    let mut close: Vec<&'static str> = names
        .iter()
        .copied()
        .filter(|n| !prefixed.contains(n) && osa_distance(typed, n) < 2)
        .collect();
    close.sort_unstable();

    prefixed.extend(close);
    prefixed
}

/// Optimal string alignment distance
fn osa_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut d = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in d[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            d[i][j] = (d[i - 1][j] + 1).min(d[i][j - 1] + 1).min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                d[i][j] = d[i][j].min(d[i - 2][j - 2] + 1);
            }
        }
    }
    d[a.len()][b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_args(["ming", "nas", "/data", "--address", "127.0.0.1:9001", "--quiet"]).unwrap();
        assert_eq!(cli.backend.name(), "nas");
        assert!(!cli.backend.wants_help());
        let config = cli.global.gateway_config();
        assert_eq!(config.address, "127.0.0.1:9001");
        assert!(config.quiet);
    }

    #[test]
    fn test_s3_default_endpoint() {
        let cli = Cli::try_parse_args(["ming", "s3"]).unwrap();
        let gateway = cli.backend.into_gateway();
        assert_eq!(gateway.endpoint().as_deref(), Some(DEFAULT_S3_ENDPOINT));
    }

    #[rstest]
    #[case(&["ming", "nas", "help"])]
    #[case(&["ming", "s3", "help"])]
    #[case(&["ming", "memory", "help"])]
    fn test_backend_help(#[case] args: &[&str]) {
        assert!(Cli::try_parse_args(args.iter().copied()).unwrap().backend.wants_help());
    }

    #[test]
    fn test_unknown_subcommand_suggests() {
        match Cli::try_parse_args(["ming", "nsa"]) {
            Err(CliError::UnknownCommand { typed, suggestions }) => {
                assert_eq!(typed, "nsa");
                assert_eq!(suggestions, vec!["nas"]);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[rstest]
    #[case("n", vec!["nas"])]
    #[case("mem", vec!["memory"])]
    #[case("s4", vec!["s3"])]
    #[case("gcs", vec![])]
    #[case("nsa", vec!["nas"])]
    fn test_closest_commands(#[case] typed: &str, #[case] expected: Vec<&str>) {
        assert_eq!(closest_commands(typed, SUB_COMMANDS), expected);
    }

    #[test]
    fn test_unknown_command_message() {
        let message = unknown_command_message("nsa", &["nas"]);
        assert_eq!(
            message,
            "'nsa' is not a ming sub-command. See 'ming --help'.\n\nDid you mean one of these?\n\t'nas'\n"
        );
        assert!(!unknown_command_message("zzz", &[]).contains("Did you mean"));
    }
}
