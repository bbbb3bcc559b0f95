//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

/// Static analysis of unit and coordinate-frame errors in UAV flight
/// software.
#[derive(Parser, Debug, Clone)]
#[command(name = "skylint", version, about)]
pub struct Args {
    /// Directory containing the compilation database (compile_commands.json)
    #[arg(short = 'c', long, value_name = "DIR")]
    pub compilation_database: PathBuf,

    /// Path to the XML file containing the MAVLink message definitions
    #[arg(short = 'm', long, value_name = "PATH")]
    pub mavlink_definitions: PathBuf,

    /// Path to the JSON file describing previously known variable types
    #[arg(short = 'p', long, value_name = "PATH")]
    pub prior_types: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
