//! Command-line parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use transport::Method;

#[derive(Parser, Debug)]
#[command(name = "marketplace", version, about = "Command-line client for the marketplace API")]
pub struct Cli {
    /// TOML config file (falls back to CONFIG_PATH, then the default path)
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Obtain and store a token pair
    #[command(after_help = "The password is read from --password-file, else MARKETPLACE_PASSWORD.")]
    Login {
        username: String,
        #[arg(long, value_name = "PATH")]
        password_file: Option<PathBuf>,
    },
    /// Forget stored tokens
    Logout,
    /// Show the signed-in profile
    Whoami,
    /// Check the stored access token
    Verify,
    /// GET an API path
    Get {
        path: String,
        #[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },
    /// Send any request, with a JSON or multipart body
    Request {
        #[arg(value_parser = parse_method)]
        method: Method,
        path: String,
        /// JSON body
        #[arg(long, value_name = "JSON", conflicts_with_all = ["form", "file"])]
        data: Option<String>,
        /// Multipart text field, repeatable
        #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
        form: Vec<(String, String)>,
        /// Multipart file field, repeatable
        #[arg(long, value_name = "KEY=PATH", value_parser = parse_file_field)]
        file: Vec<(String, PathBuf)>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got: {raw}"))
}

fn parse_file_field(raw: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = parse_key_value(raw)?;
    if path.is_empty() {
        return Err(format!("missing file path in: {raw}"));
    }
    Ok((name, PathBuf::from(path)))
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {raw}"))
}
