// posture/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use posture_core::domain::dataset::EvalContext;

#[derive(Parser)]
#[command(name = "posture")]
#[command(about = "Security posture rules, evaluated against connector datasets", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    Global,
    #[value(name = "connector_instance", alias = "connector-instance")]
    ConnectorInstance,
}

/// Which evaluation context to run or read.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    #[arg(long, value_enum, default_value = "global")]
    pub scope: ScopeArg,

    /// Connector kind, e.g. "okta" (required for connector_instance)
    #[arg(long, env = "POSTURE_CONNECTOR_KIND")]
    pub connector_kind: Option<String>,

    /// Connector instance name, e.g. "prod" (required for connector_instance)
    #[arg(long, env = "POSTURE_CONNECTOR_INSTANCE")]
    pub connector_instance: Option<String>,
}

impl ScopeArgs {
    pub fn context(&self) -> anyhow::Result<EvalContext> {
        match self.scope {
            ScopeArg::Global => Ok(EvalContext::global()),
            ScopeArg::ConnectorInstance => {
                let (Some(kind), Some(instance)) = (&self.connector_kind, &self.connector_instance)
                else {
                    anyhow::bail!(
                        "--scope connector_instance needs --connector-kind and --connector-instance"
                    );
                };
                Ok(EvalContext::connector(kind, instance))
            }
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🚀 Evaluates every applicable rule for one scope
    Run {
        /// Project directory
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// ✅ Checks that every rule definition in the catalog parses
    Validate {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// 📦 Lists the datasets the configured provider can serve
    Datasets {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// 📊 Shows current results from the project's database
    Results {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,
    },
}
