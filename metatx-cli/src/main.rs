use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::{hex, Address, Bytes, B256};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use metatx_client::address::{compute_deployed_address_from_code, compute_proxy_address, proxy_salt};
use metatx_client::batcher::{batch, decode_batch};
use metatx_client::encoding::deployment_salt;
use metatx_types::BatchEntry;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Offline meta-transaction helpers: derive CREATE2 addresses and build or inspect batches.
///
/// Every command prints a JSON object. With `--out` the object is also written to a file,
/// replacing it atomically.
#[derive(Parser, Debug)]
#[command(name = "metatx", author, version, about)]
struct Cli {
    /// Also write the result to this JSON file (eg, artifacts/proxy.json).
    #[arg(long, global = true, env = "METATX_OUT")]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Address of a signer's proxy account or smart wallet.
    ProxyAddress {
        /// Proxy factory.
        #[arg(long, env = "METATX_PROXY_DEPLOYER")]
        factory: Address,

        #[arg(long)]
        signer: Address,

        /// Implementation behind the proxy (base account or wallet singleton).
        #[arg(long, env = "METATX_PROXY_IMPLEMENTATION")]
        implementation: Address,
    },

    /// Address a CREATE2 deployment lands at.
    ///
    /// Pass `--salt` for a plain CREATE2, or `--signer` and `--replay-protection` for a
    /// meta-deployment executed by `--deployer`.
    DeployedAddress {
        #[arg(long)]
        deployer: Address,

        /// Init code as hex (0x...).
        #[arg(long, value_parser = parse_bytes, conflicts_with = "init_code_file")]
        init_code: Option<Bytes>,

        /// File holding the init code as hex.
        #[arg(long, conflicts_with = "init_code")]
        init_code_file: Option<PathBuf>,

        #[arg(long, conflicts_with_all = ["signer", "replay_protection"])]
        salt: Option<B256>,

        #[arg(long, requires = "replay_protection")]
        signer: Option<Address>,

        /// Encoded replay-protection token the deployment was signed with.
        #[arg(long, value_parser = parse_bytes, requires = "signer")]
        replay_protection: Option<Bytes>,
    },

    /// Encode a JSON list of batch entries into a multi-send delegatecall.
    BatchEncode {
        #[arg(long, env = "METATX_MULTI_SEND")]
        multi_send: Address,

        /// JSON file with `[{ "target": "0x..", "data": "0x..", "revert_on_fail": true }, ..]`.
        #[arg(long)]
        entries: PathBuf,
    },

    /// Decode multi-send calldata back into its entries.
    BatchDecode {
        /// Calldata as hex (0x...).
        #[arg(long, value_parser = parse_bytes)]
        data: Bytes,
    },
}

/// Hex-decodes a byte argument; clap would otherwise take the raw UTF-8 of the string.
fn parse_bytes(s: &str) -> Result<Bytes, hex::FromHexError> {
    s.parse()
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = run(&cli.command)?;

    if let Some(path) = &cli.out {
        write_artifact(path, &cli.command, &output)?;
        debug!(target: "metatx::cli", path = %path.display(), "wrote artifact");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("failed serialising output")?
    );
    Ok(())
}

fn run(command: &Command) -> Result<Value> {
    match command {
        Command::ProxyAddress {
            factory,
            signer,
            implementation,
        } => {
            let address = compute_proxy_address(*factory, *signer, *implementation);
            Ok(json!({
                "address": address,
                "factory": factory,
                "signer": signer,
                "implementation": implementation,
                "salt": proxy_salt(*signer),
            }))
        }
        Command::DeployedAddress {
            deployer,
            init_code,
            init_code_file,
            salt,
            signer,
            replay_protection,
        } => {
            let init_code = match (init_code, init_code_file) {
                (Some(code), _) => code.clone(),
                (None, Some(path)) => read_hex_file(path)?,
                (None, None) => return Err(anyhow!("missing init code: pass --init-code or --init-code-file")),
            };
            let salt = match (salt, signer, replay_protection) {
                (Some(salt), _, _) => *salt,
                (None, Some(signer), Some(replay_protection)) => {
                    deployment_salt(*signer, replay_protection)
                }
                _ => {
                    return Err(anyhow!(
                        "missing salt: pass --salt, or --signer with --replay-protection"
                    ))
                }
            };
            let address = compute_deployed_address_from_code(*deployer, &init_code, salt);
            Ok(json!({
                "address": address,
                "deployer": deployer,
                "salt": salt,
                "init_code_len": init_code.len(),
            }))
        }
        Command::BatchEncode {
            multi_send,
            entries: path,
        } => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            let entries: Vec<BatchEntry> = serde_json::from_str(&raw)
                .with_context(|| format!("failed parsing batch entries in {}", path.display()))?;
            let call = batch(*multi_send, &entries)?;
            Ok(json!({
                "target": call.target,
                "operation": call.kind,
                "data": call.data,
                "entries": entries.len(),
            }))
        }
        Command::BatchDecode { data } => {
            let entries = decode_batch(data)?;
            Ok(json!({ "entries": entries }))
        }
    }
}

fn read_hex_file(path: &Path) -> Result<Bytes> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    raw.trim()
        .parse::<Bytes>()
        .with_context(|| format!("failed parsing hex in {}", path.display()))
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::ProxyAddress { .. } => "proxy-address",
        Command::DeployedAddress { .. } => "deployed-address",
        Command::BatchEncode { .. } => "batch-encode",
        Command::BatchDecode { .. } => "batch-decode",
    }
}

/// Merge `output` into the artifact at `path` under the command's name.
fn write_artifact(path: &Path, command: &Command, output: &Value) -> Result<()> {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());

    let existing = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?
    } else {
        String::new()
    };

    let mut root: Value = if existing.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&existing)
            .with_context(|| format!("failed parsing JSON in {}", path.display()))?
    };
    if !root.is_object() {
        root = json!({});
    }

    root["updated_at"] = json!(now);
    let mut entry = output.clone();
    entry["generated_at"] = json!(now);
    root[command_name(command)] = entry;

    write_json_atomic(path, &root)
}

fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }

    let serialised = serde_json::to_string_pretty(value).context("failed serialising artifact JSON")?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, serialised.as_bytes())
        .with_context(|| format!("failed writing temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("failed replacing {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
