use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use reconcile::ParamAction;

#[derive(Parser)]
#[command(name = "xectl")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Resumable, typed workflows over the XenServer xe CLI", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Answer yes to confirmation prompts
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Path to the xe binary (overrides config)
    #[arg(long, global = true, env = "XECTL_XE", value_name = "PATH")]
    pub xe: Option<String>,

    /// Per-command timeout in seconds (overrides config)
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import a VM image, name it and start it
    Import(ImportArgs),

    /// Get or change a VM parameter
    Param(ParamArgs),

    /// Resume a halted plan
    Resume(ResumeArgs),

    /// Inspect saved (halted) plans
    #[command(subcommand)]
    Plans(PlansCommand),

    /// List the operations xectl knows
    Ops,

    /// Show configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Workflows
// ============================================================================

#[derive(Args)]
pub struct ImportArgs {
    /// Image file to import (path as seen by the xe host)
    pub filename: String,

    /// Name label for the new VM
    #[arg(long)]
    pub name_label: String,

    /// Name description for the new VM
    #[arg(long)]
    pub name_description: String,

    /// Name of the storage repository to import into
    #[arg(long)]
    pub sr_name: String,

    /// Show the commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct ParamArgs {
    /// What to do with the parameter
    #[arg(value_enum)]
    pub action: ParamActionArg,

    /// Parameter name (e.g. name-label, other-config)
    pub param_name: String,

    /// VM UUIDs; several run concurrently
    #[arg(required = true, num_args = 1..)]
    pub uuids: Vec<String>,

    /// Map key (get, add, remove)
    #[arg(long)]
    pub key: Option<String>,

    /// Value (set, add)
    #[arg(long)]
    pub value: Option<String>,

    /// Number of VMs to work on at once
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Show the commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ParamActionArg {
    Get,
    Set,
    Add,
    Remove,
    Clear,
}

impl From<ParamActionArg> for ParamAction {
    fn from(arg: ParamActionArg) -> Self {
        match arg {
            ParamActionArg::Get => Self::Get,
            ParamActionArg::Set => Self::Set,
            ParamActionArg::Add => Self::Add,
            ParamActionArg::Remove => Self::Remove,
            ParamActionArg::Clear => Self::Clear,
        }
    }
}

#[derive(Args)]
pub struct ResumeArgs {
    /// Id of the saved plan (see `xectl plans list`)
    pub plan_id: String,

    /// Show the remaining commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

// ============================================================================
// Plans / Config
// ============================================================================

#[derive(Subcommand)]
pub enum PlansCommand {
    /// List halted plans
    List,

    /// Show a halted plan with its checkpoint and error
    Show {
        /// Plan id
        plan_id: String,
    },

    /// Forget a halted plan
    Discard {
        /// Plan id
        plan_id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show config location and effective values
    Show,
}
