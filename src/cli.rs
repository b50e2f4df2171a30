use clap::Parser;
use std::path::PathBuf;

/// Default location of the client configuration file
pub const DEFAULT_CONFIG: &str = "/etc/deploy-app/client.toml";

#[derive(Parser, Debug)]
#[command(name = "deploy-app")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Deploy an application by converging the recipes its roles need", long_about = None)]
pub struct Cli {
    /// Name of the application to deploy
    #[arg(value_name = "APPLICATION")]
    pub application: Option<String>,

    /// The configuration file to use
    #[arg(short, long, value_name = "CONFIG", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Set the log level (debug, info, warn, error, fatal)
    #[arg(short, long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Set the log file location, defaults to STDOUT
    #[arg(short = 'L', long = "logfile", value_name = "LOGLOCATION")]
    pub log_location: Option<String>,

    /// User to set privilege to
    #[arg(short, long)]
    pub user: Option<String>,

    /// Group to set privilege to
    #[arg(short, long)]
    pub group: Option<String>,

    /// Load attributes from a JSON file or URL
    #[arg(short = 'j', long = "json-attributes", value_name = "JSON_ATTRIBS")]
    pub json_attribs: Option<String>,

    /// The node name for this client
    #[arg(short = 'N', long = "node-name", value_name = "NODE_NAME")]
    pub node_name: Option<String>,

    /// The server URL
    #[arg(short = 'S', long = "server", value_name = "SERVERURL")]
    pub server_url: Option<String>,

    /// Set the environment on the node
    #[arg(short = 'E', long)]
    pub environment: Option<String>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
