use clap::Parser;

/// Canopy MCP gateway
#[derive(Debug, Parser)]
#[command(name = "canopy", about = "Self-hosted gateway aggregating MCP servers behind one endpoint")]
pub struct Args {
    /// Override the HTTP port (falls back to PORT, then 8080)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log filter directive (e.g. "info" or "canopy=debug,info")
    #[arg(long, default_value = "info", env = "CANOPY_LOG")]
    pub log_filter: String,
}
