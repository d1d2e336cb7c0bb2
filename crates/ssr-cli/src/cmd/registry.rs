use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use ssr_core::config::Config;
use ssr_core::registry::EncodingRegistry;
use ssr_core::store::EncodingStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum RegistrySubcommand {
    /// List every pair stored in a namespace
    List {
        #[arg(long, short = 'n')]
        namespace: String,
    },

    /// Look up the decoded string for one encoded string
    Get {
        #[arg(long, short = 'n')]
        namespace: String,

        code: String,
    },

    /// List namespaces that hold at least one pair
    Namespaces,
}

pub fn run(root: &Path, subcmd: RegistrySubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = super::open_store(root, &config)?;

    match subcmd {
        RegistrySubcommand::List { namespace } => {
            let registry = EncodingRegistry::new(&store, namespace)?;
            let pairs = registry.list()?;
            if json {
                print_json(&pairs)?;
            } else if pairs.is_empty() {
                println!("{}: no encodings", registry.namespace());
            } else {
                let rows = pairs
                    .into_iter()
                    .map(|p| vec![p.encoded, p.decoded])
                    .collect();
                print_table(&["ENCODED", "DECODED"], rows);
            }
        }
        RegistrySubcommand::Get { namespace, code } => {
            let registry = EncodingRegistry::new(&store, namespace)?;
            let Some(decoded) = registry.get(&code)? else {
                anyhow::bail!("'{code}' not found in {}", registry.namespace());
            };
            if json {
                print_json(&serde_json::json!({ "encoded": code, "decoded": decoded }))?;
            } else {
                println!("{decoded}");
            }
        }
        RegistrySubcommand::Namespaces => {
            let namespaces = store.namespaces()?;
            if json {
                print_json(&namespaces)?;
            } else {
                for ns in namespaces {
                    println!("{ns}");
                }
            }
        }
    }
    Ok(())
}
